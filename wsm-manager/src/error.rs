use thiserror::Error;

pub type Result<T> = std::result::Result<T, ManagerError>;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    #[error("Task {task_handle} did not reach RUNNING state within {timeout_secs}s")]
    LaunchTimeout {
        task_handle: String,
        timeout_secs: u64,
    },

    #[error("Could not determine workspace URL for task {0}")]
    MissingNetworkAddress(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
