use std::time::Duration;
use tokio::time;
use tracing::{error, info};
use wsm_manager::{MonitorReport, WorkspaceManager};

/// Run the idle sweep on a fixed interval
pub async fn start_monitor_task(manager: WorkspaceManager, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;
        if let Err(e) = run_monitor(&manager).await {
            error!("Scheduled monitor failed: {}", e);
        }
    }
}

/// One monitor pass.
pub async fn run_monitor(manager: &WorkspaceManager) -> wsm_manager::Result<MonitorReport> {
    let report = manager.monitor().await?;
    info!(
        "Monitor: {} active, {} terminated, {} failed, {} reconciled",
        report.active, report.terminated, report.failed, report.reconciled
    );
    Ok(report)
}

/// Purge expired records on a fixed interval
pub async fn start_janitor_task(manager: WorkspaceManager, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;
        if let Err(e) = cleanup_expired_records(&manager).await {
            error!("Janitor error: {}", e);
        }
    }
}

pub async fn cleanup_expired_records(manager: &WorkspaceManager) -> wsm_manager::Result<u64> {
    let purged = manager.purge_expired().await?;
    if purged > 0 {
        info!("Purged {} expired workspace records", purged);
    }
    Ok(purged)
}
