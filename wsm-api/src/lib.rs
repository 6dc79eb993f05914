pub mod api_docs;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_app;
pub use scheduler::{start_janitor_task, start_monitor_task};
pub use state::AppState;
