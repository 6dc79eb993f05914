//! State store for workspace records and leases.
//!
//! Every mutation that races with another invocation is a conditional
//! update; callers look at the returned flag to learn whether they won.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::error::{ManagerError, Result};
use crate::record::{WorkspaceKind, WorkspaceRecord, WorkspaceStatus, WARM_POOL_OWNER};

#[derive(Clone)]
pub struct WorkspaceStore {
    pool: SqlitePool,
}

impl WorkspaceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new record. Fails if the task handle is already tracked.
    #[instrument(skip(self, record), fields(task_handle = %record.task_handle))]
    pub async fn put(&self, record: &WorkspaceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workspaces (task_handle, owner_id, workspace_kind, status, url, last_activity, created_at, stopped_at, stop_reason, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.task_handle)
        .bind(&record.owner_id)
        .bind(record.workspace_kind)
        .bind(record.status)
        .bind(&record.url)
        .bind(record.last_activity.timestamp_millis())
        .bind(record.created_at.timestamp_millis())
        .bind(record.stopped_at.map(|dt| dt.timestamp_millis()))
        .bind(&record.stop_reason)
        .bind(record.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, task_handle: &str) -> Result<WorkspaceRecord> {
        let row = sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspaces WHERE task_handle = ?")
            .bind(task_handle)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ManagerError::NotFound(task_handle.to_string()))?;

        Ok(row.into())
    }

    /// Most recently active record owned by `owner_id`, whatever its status.
    pub async fn latest_for_owner(&self, owner_id: &str) -> Result<Option<WorkspaceRecord>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT * FROM workspaces WHERE owner_id = ? ORDER BY last_activity DESC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Unassigned running records of a kind, oldest first.
    pub async fn find_warm(&self, kind: WorkspaceKind, limit: u32) -> Result<Vec<WorkspaceRecord>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT * FROM workspaces
             WHERE status = ? AND workspace_kind = ? AND owner_id = ?
             ORDER BY created_at ASC
             LIMIT ?",
        )
        .bind(WorkspaceStatus::Running)
        .bind(kind)
        .bind(WARM_POOL_OWNER)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_warm(&self, kind: WorkspaceKind) -> Result<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workspaces
             WHERE status = ? AND workspace_kind = ? AND owner_id = ?",
        )
        .bind(WorkspaceStatus::Running)
        .bind(kind)
        .bind(WARM_POOL_OWNER)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Hand a warm record to `owner_id`.
    ///
    /// Returns `false` when the record is no longer warm, i.e. another
    /// invocation claimed or stopped it first.
    #[instrument(skip(self))]
    pub async fn claim_warm(
        &self,
        task_handle: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workspaces
             SET owner_id = ?, last_activity = ?
             WHERE task_handle = ? AND owner_id = ? AND status = ?",
        )
        .bind(owner_id)
        .bind(now.timestamp_millis())
        .bind(task_handle)
        .bind(WARM_POOL_OWNER)
        .bind(WorkspaceStatus::Running)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a running record to stopped. Returns `false` if it was not running.
    #[instrument(skip(self))]
    pub async fn mark_stopped(
        &self,
        task_handle: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workspaces
             SET status = ?, stopped_at = ?, stop_reason = ?
             WHERE task_handle = ? AND status = ?",
        )
        .bind(WorkspaceStatus::Stopped)
        .bind(now.timestamp_millis())
        .bind(reason)
        .bind(task_handle)
        .bind(WorkspaceStatus::Running)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record user activity on a running workspace.
    pub async fn touch(&self, task_handle: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workspaces SET last_activity = ? WHERE task_handle = ? AND status = ?",
        )
        .bind(now.timestamp_millis())
        .bind(task_handle)
        .bind(WorkspaceStatus::Running)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// One page of running records, keyset-paginated on the task handle.
    pub async fn running_page(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkspaceRecord>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT * FROM workspaces
             WHERE status = ? AND task_handle > ?
             ORDER BY task_handle ASC
             LIMIT ?",
        )
        .bind(WorkspaceStatus::Running)
        .bind(after.unwrap_or(""))
        .bind(i64::from(limit.max(1)))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete records whose expiry has passed. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM workspaces WHERE expires_at < ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Take the named lease if it is free or expired.
    pub async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO leases (name, holder, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE
             SET holder = excluded.holder, expires_at = excluded.expires_at
             WHERE leases.expires_at < ?",
        )
        .bind(name)
        .bind(holder)
        .bind(
            now.checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
                .timestamp_millis(),
        )
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Give the lease back. A lease taken over after expiry is left alone.
    pub async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM leases WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// Internal row type for sqlx
#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    task_handle: String,
    owner_id: String,
    workspace_kind: WorkspaceKind,
    status: WorkspaceStatus,
    url: String,
    last_activity: i64,
    created_at: i64,
    stopped_at: Option<i64>,
    stop_reason: Option<String>,
    expires_at: i64,
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl From<WorkspaceRow> for WorkspaceRecord {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            task_handle: row.task_handle,
            owner_id: row.owner_id,
            workspace_kind: row.workspace_kind,
            status: row.status,
            url: row.url,
            last_activity: from_millis(row.last_activity),
            created_at: from_millis(row.created_at),
            stopped_at: row.stopped_at.map(from_millis),
            stop_reason: row.stop_reason,
            expires_at: from_millis(row.expires_at),
        }
    }
}
