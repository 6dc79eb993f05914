use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Owner id carried by containers that sit in the warm pool, unassigned.
pub const WARM_POOL_OWNER: &str = "warm_pool";

/// Tag value identifying containers started by this service.
pub const MANAGED_BY: &str = "workspace_manager";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum WorkspaceKind {
    /// Browser-based interactive code editor
    #[default]
    #[serde(alias = "vscode")]
    Editor,
    /// Analytics dashboard
    #[serde(alias = "superset")]
    Dashboard,
}

impl WorkspaceKind {
    pub const ALL: [WorkspaceKind; 2] = [WorkspaceKind::Editor, WorkspaceKind::Dashboard];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceKind::Editor => "editor",
            WorkspaceKind::Dashboard => "dashboard",
        }
    }

    /// Port the workspace image listens on.
    pub fn port(&self) -> u16 {
        match self {
            WorkspaceKind::Editor => 8080,
            WorkspaceKind::Dashboard => 8088,
        }
    }
}

impl fmt::Display for WorkspaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Running,
    Stopped,
}

/// A container assignment as persisted in the state store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceRecord {
    pub task_handle: String,
    pub owner_id: String,
    pub workspace_kind: WorkspaceKind,
    pub status: WorkspaceStatus,
    pub url: String,

    #[serde(serialize_with = "serialize_datetime")]
    pub last_activity: DateTime<Utc>,

    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(serialize_with = "serialize_optional_datetime")]
    pub stopped_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    #[serde(serialize_with = "serialize_datetime")]
    pub expires_at: DateTime<Utc>,
}

impl WorkspaceRecord {
    /// Build a fresh running record. `expires_at` is `now + ttl`, capped at
    /// the latest representable time.
    pub fn running(
        task_handle: impl Into<String>,
        owner_id: impl Into<String>,
        workspace_kind: WorkspaceKind,
        url: impl Into<String>,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            task_handle: task_handle.into(),
            owner_id: owner_id.into(),
            workspace_kind,
            status: WorkspaceStatus::Running,
            url: url.into(),
            last_activity: now,
            created_at: now,
            stopped_at: None,
            stop_reason: None,
            expires_at,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == WorkspaceStatus::Running
    }

    pub fn is_warm(&self) -> bool {
        self.is_running() && self.owner_id == WARM_POOL_OWNER
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity
    }
}

// Serialize DateTime as RFC 3339 / ISO 8601 string
fn serialize_datetime<S>(dt: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339())
}

fn serialize_optional_datetime<S>(
    dt: &Option<DateTime<Utc>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match dt {
        Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_kind_names_are_accepted() {
        let kind: WorkspaceKind = serde_json::from_str("\"vscode\"").unwrap();
        assert_eq!(kind, WorkspaceKind::Editor);

        let kind: WorkspaceKind = serde_json::from_str("\"superset\"").unwrap();
        assert_eq!(kind, WorkspaceKind::Dashboard);

        assert_eq!(serde_json::to_string(&WorkspaceKind::Dashboard).unwrap(), "\"dashboard\"");
    }

    #[test]
    fn test_kind_ports() {
        assert_eq!(WorkspaceKind::Editor.port(), 8080);
        assert_eq!(WorkspaceKind::Dashboard.port(), 8088);
    }

    #[test]
    fn test_running_record_expires_after_ttl() {
        let record = WorkspaceRecord::running(
            "task-1",
            WARM_POOL_OWNER,
            WorkspaceKind::Editor,
            "http://10.0.0.1:8080",
            chrono::Duration::days(7),
        );

        assert!(record.is_warm());
        assert_eq!(record.expires_at - record.created_at, chrono::Duration::days(7));
        assert!(record.stopped_at.is_none());
    }

    #[test]
    fn test_huge_ttl_caps_expiry() {
        let record = WorkspaceRecord::running(
            "task-1",
            "alice",
            WorkspaceKind::Editor,
            "http://10.0.0.1:8080",
            chrono::Duration::days(100_000_000),
        );

        assert_eq!(record.expires_at, DateTime::<Utc>::MAX_UTC);
    }
}
