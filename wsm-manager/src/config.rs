use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::record::WorkspaceKind;

/// Runtime settings for the workspace manager, read from `WSM_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_cluster")]
    pub cluster: String,

    #[serde(default = "default_editor_task_definition")]
    pub editor_task_definition: String,

    #[serde(default = "default_dashboard_task_definition")]
    pub dashboard_task_definition: String,

    #[serde(default = "default_subnets")]
    pub subnets: Vec<String>,

    #[serde(default = "default_security_group")]
    pub security_group: String,

    #[serde(default = "default_table_name")]
    pub table_name: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_warm_pool_size")]
    pub warm_pool_size: u32,

    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: i64,

    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_record_ttl_days")]
    pub record_ttl_days: i64,

    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: i64,

    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: u32,

    #[serde(default = "default_metrics_namespace")]
    pub metrics_namespace: String,

    #[serde(default = "default_reconcile")]
    pub reconcile: bool,
}

const DEFAULT_IDLE_TIMEOUT_MINUTES: i64 = 30;
const DEFAULT_RECORD_TTL_DAYS: i64 = 7;
const DEFAULT_LEASE_TTL_SECS: i64 = 300;

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(fallback)
}

fn default_cluster() -> String {
    env_or("WSM_CLUSTER", "workspaces".to_string())
}

fn default_editor_task_definition() -> String {
    env_or(
        "WSM_EDITOR_TASK_DEF",
        "codercom/code-server:latest".to_string(),
    )
}

fn default_dashboard_task_definition() -> String {
    env_or(
        "WSM_DASHBOARD_TASK_DEF",
        "apache/superset:latest".to_string(),
    )
}

fn default_subnets() -> Vec<String> {
    let raw = std::env::var("WSM_SUBNETS").unwrap_or_else(|_| "bridge".to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_security_group() -> String {
    env_or("WSM_SECURITY_GROUP", "default".to_string())
}

fn default_table_name() -> String {
    env_or("WSM_TABLE", "workspaces".to_string())
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("WSM_DB_PATH") {
        return PathBuf::from(path);
    }

    let file_name = format!("{}.db", default_table_name());

    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("wsm").join(file_name)
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".wsm").join(file_name)
    }
}

fn default_warm_pool_size() -> u32 {
    env_or("WSM_WARM_POOL_SIZE", 3)
}

fn default_idle_timeout_minutes() -> i64 {
    env_or("WSM_IDLE_TIMEOUT_MINUTES", DEFAULT_IDLE_TIMEOUT_MINUTES)
}

fn default_launch_timeout_secs() -> u64 {
    env_or("WSM_LAUNCH_TIMEOUT_SECS", 60)
}

fn default_poll_interval_ms() -> u64 {
    env_or("WSM_POLL_INTERVAL_MS", 2000)
}

fn default_record_ttl_days() -> i64 {
    env_or("WSM_RECORD_TTL_DAYS", DEFAULT_RECORD_TTL_DAYS)
}

fn default_lease_ttl_secs() -> i64 {
    env_or("WSM_LEASE_TTL_SECS", DEFAULT_LEASE_TTL_SECS)
}

fn default_scan_page_size() -> u32 {
    env_or("WSM_SCAN_PAGE_SIZE", 100)
}

fn default_metrics_namespace() -> String {
    env_or("WSM_METRICS_NAMESPACE", "Workspaces".to_string())
}

fn default_reconcile() -> bool {
    env_or("WSM_RECONCILE", true)
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            editor_task_definition: default_editor_task_definition(),
            dashboard_task_definition: default_dashboard_task_definition(),
            subnets: default_subnets(),
            security_group: default_security_group(),
            table_name: default_table_name(),
            db_path: default_db_path(),
            warm_pool_size: default_warm_pool_size(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
            launch_timeout_secs: default_launch_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            record_ttl_days: default_record_ttl_days(),
            lease_ttl_secs: default_lease_ttl_secs(),
            scan_page_size: default_scan_page_size(),
            metrics_namespace: default_metrics_namespace(),
            reconcile: default_reconcile(),
        }
    }
}

impl ManagerConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn task_definition(&self, kind: WorkspaceKind) -> &str {
        match kind {
            WorkspaceKind::Editor => &self.editor_task_definition,
            WorkspaceKind::Dashboard => &self.dashboard_task_definition,
        }
    }

    // Out-of-range settings fall back to the defaults.

    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.idle_timeout_minutes)
            .unwrap_or_else(|| chrono::Duration::minutes(DEFAULT_IDLE_TIMEOUT_MINUTES))
    }

    pub fn record_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.record_ttl_days)
            .unwrap_or_else(|| chrono::Duration::days(DEFAULT_RECORD_TTL_DAYS))
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.lease_ttl_secs)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_LEASE_TTL_SECS))
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
