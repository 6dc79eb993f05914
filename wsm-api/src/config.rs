use serde::Deserialize;
use wsm_manager::ManagerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Seconds between scheduled monitor runs. Zero disables the schedule.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,

    /// Shared secret required on `/invoke` when set.
    #[serde(default = "default_invoke_token")]
    pub invoke_token: Option<String>,

    #[serde(default = "ManagerConfig::from_env")]
    pub manager: ManagerConfig,
}

fn default_bind_addr() -> String {
    std::env::var("WSM_API_BIND").unwrap_or_else(|_| "0.0.0.0:3131".to_string())
}

fn default_monitor_interval() -> u64 {
    std::env::var("WSM_API_MONITOR_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300) // 5 minutes
}

fn default_janitor_interval() -> u64 {
    std::env::var("WSM_API_JANITOR_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3600) // 1 hour
}

fn default_invoke_token() -> Option<String> {
    std::env::var("WSM_API_INVOKE_TOKEN")
        .ok()
        .filter(|s| !s.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            monitor_interval_secs: default_monitor_interval(),
            janitor_interval_secs: default_janitor_interval(),
            invoke_token: default_invoke_token(),
            manager: ManagerConfig::from_env(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
