//! Warm pool refills triggered by assignments.
//!
//! Launch handlers enqueue the kind they just drew from; a single worker
//! drains the queue and runs the lease-guarded maintainer for that kind.
//! A dropped request is harmless: the periodic maintainer catches up.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

use crate::manager::WorkspaceManager;
use crate::record::WorkspaceKind;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct ReplenishQueue {
    tx: mpsc::Sender<WorkspaceKind>,
}

impl ReplenishQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WorkspaceKind>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a refill without waiting. Returns whether it was accepted.
    pub fn request(&self, kind: WorkspaceKind) -> bool {
        match self.tx.try_send(kind) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Replenish queue full, dropping {} refill request", kind);
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Replenish worker stopped, dropping {} refill request", kind);
                false
            }
        }
    }
}

/// Drain refill requests until every sender is gone.
pub async fn run_replenisher(manager: WorkspaceManager, mut rx: mpsc::Receiver<WorkspaceKind>) {
    info!("Replenish worker running");

    while let Some(kind) = rx.recv().await {
        // Requests for the same kind queued meanwhile are covered by this run.
        let mut pending = vec![kind];
        while let Ok(next) = rx.try_recv() {
            if !pending.contains(&next) {
                pending.push(next);
            }
        }

        for kind in pending {
            match manager.maintain_kind(kind).await {
                Ok(status) => info!(
                    "Replenished {} pool: {} warm, {} launched",
                    kind, status.warm, status.launched
                ),
                Err(e) => error!("Failed to replenish {} pool: {}", kind, e),
            }
        }
    }

    info!("Replenish worker stopped");
}
