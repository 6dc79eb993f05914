//! On-demand workspace provisioning.
//!
//! Keeps a warm pool of unassigned workspace containers, hands them to users
//! on request, launches on demand when the pool is empty and reaps idle
//! workspaces. Consumed by the wsm-api service, but every handler can be
//! driven directly through [`action::dispatch`].

pub mod action;
pub mod config;
pub mod db;
pub mod docker;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod orchestrator;
pub mod record;
pub mod replenish;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use action::{dispatch, dispatch_value, Action, ActionResponse, WorkspaceEvent};
pub use config::ManagerConfig;
pub use error::{ManagerError, Result};
pub use manager::{
    LaunchOutcome, LaunchSource, MonitorReport, PoolStatus, TerminationResult, WarmPoolReport,
    WorkspaceManager,
};
pub use orchestrator::ContainerOrchestrator;
pub use record::{WorkspaceKind, WorkspaceRecord, WorkspaceStatus, WARM_POOL_OWNER};
pub use store::WorkspaceStore;
