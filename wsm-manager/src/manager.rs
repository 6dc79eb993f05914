//! Workspace lifecycle handlers: launch, idle sweep, termination and
//! warm pool maintenance.

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::metrics::{
    MetricUnit, MetricsRecorder, MetricsSink, ACTIVE_WORKSPACES, TERMINATED_WORKSPACES,
    WARM_POOL_HIT, WARM_POOL_MISS, WORKSPACE_LAUNCH_TIME,
};
use crate::orchestrator::{ContainerOrchestrator, NetworkConfig, RunTaskRequest, TaskDescription, TaskState};
use crate::record::{WorkspaceKind, WorkspaceRecord, MANAGED_BY, WARM_POOL_OWNER};
use crate::replenish::ReplenishQueue;
use crate::store::WorkspaceStore;

pub const IDLE_TIMEOUT_REASON: &str = "idle_timeout";
pub const RECONCILED_REASON: &str = "reconciled";

/// Warm records fetched per claim round.
const CLAIM_BATCH: u32 = 3;
/// Claim rounds before falling back to an on-demand launch.
const MAX_CLAIM_ROUNDS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LaunchSource {
    Existing,
    WarmPool,
    OnDemand,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LaunchOutcome {
    pub status: String,
    pub url: String,
    pub task_arn: String,
    /// Seconds from request to a reachable container.
    pub startup_time: f64,
    pub source: LaunchSource,
}

impl LaunchOutcome {
    fn ready(record: &WorkspaceRecord, startup_time: f64, source: LaunchSource) -> Self {
        Self {
            status: "ready".to_string(),
            url: record.url.clone(),
            task_arn: record.task_handle.clone(),
            startup_time,
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminationResult {
    Terminated { task_arn: String },
    Failed { task_arn: String, error: String },
}

impl TerminationResult {
    pub fn is_terminated(&self) -> bool {
        matches!(self, TerminationResult::Terminated { .. })
    }
}

/// Outcome of maintaining one kind's slice of the warm pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolStatus {
    pub kind: WorkspaceKind,
    pub warm: u32,
    pub launched: u32,
    /// Another maintainer held the lease for this kind.
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WarmPoolReport {
    pub editor_warm: u32,
    pub dashboard_warm: u32,
    pub launched: u32,
    pub skipped: Vec<WorkspaceKind>,
}

impl WarmPoolReport {
    fn from_statuses(statuses: &[PoolStatus]) -> Self {
        let mut report = WarmPoolReport::default();
        for status in statuses {
            match status.kind {
                WorkspaceKind::Editor => report.editor_warm = status.warm,
                WorkspaceKind::Dashboard => report.dashboard_warm = status.warm,
            }
            report.launched += status.launched;
            if status.skipped {
                report.skipped.push(status.kind);
            }
        }
        report
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MonitorReport {
    pub active: u32,
    pub terminated: u32,
    pub failed: u32,
    pub reconciled: u32,
    pub warm_pool: WarmPoolReport,
}

#[derive(Clone)]
pub struct WorkspaceManager {
    config: Arc<ManagerConfig>,
    store: WorkspaceStore,
    orchestrator: Arc<dyn ContainerOrchestrator>,
    metrics: MetricsRecorder,
    replenisher: Option<ReplenishQueue>,
}

impl WorkspaceManager {
    pub fn new(
        config: ManagerConfig,
        store: WorkspaceStore,
        orchestrator: Arc<dyn ContainerOrchestrator>,
        metrics_sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let metrics = MetricsRecorder::new(config.metrics_namespace.clone(), metrics_sink);
        Self {
            config: Arc::new(config),
            store,
            orchestrator,
            metrics,
            replenisher: None,
        }
    }

    /// Route warm pool refills after an assignment through `queue`.
    pub fn with_replenisher(mut self, queue: ReplenishQueue) -> Self {
        self.replenisher = Some(queue);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Give `user_id` a ready workspace of `kind`.
    ///
    /// Order of preference: the user's running workspace, a warm container,
    /// then an on-demand launch.
    #[instrument(skip(self))]
    pub async fn launch(&self, user_id: &str, kind: WorkspaceKind) -> Result<LaunchOutcome> {
        let user_id = user_id.trim();
        if user_id.is_empty() || user_id == WARM_POOL_OWNER {
            return Err(ManagerError::InvalidInput(format!(
                "invalid user_id: {:?}",
                user_id
            )));
        }

        info!("Launching {} workspace for user {}", kind, user_id);

        // Trusts the stored status; stale records are caught by the sweep.
        if let Some(existing) = self.store.latest_for_owner(user_id).await? {
            if existing.is_running() {
                info!("User {} already has running workspace", user_id);
                return Ok(LaunchOutcome::ready(&existing, 0.0, LaunchSource::Existing));
            }
        }

        if let Some(warm) = self.claim_warm_container(user_id, kind).await? {
            info!(
                "Assigned warm container {} to user {}",
                warm.task_handle, user_id
            );
            self.request_replenish(kind);

            self.metrics
                .record(WORKSPACE_LAUNCH_TIME, 0.0, MetricUnit::Seconds)
                .await;
            self.metrics.record(WARM_POOL_HIT, 1.0, MetricUnit::Count).await;

            return Ok(LaunchOutcome::ready(&warm, 0.0, LaunchSource::WarmPool));
        }

        info!("No warm container available, launching on-demand");
        let started = Instant::now();
        let record = self.provision(user_id, kind).await?;
        let startup_time = started.elapsed().as_secs_f64();

        self.metrics
            .record(WORKSPACE_LAUNCH_TIME, startup_time, MetricUnit::Seconds)
            .await;
        self.metrics.record(WARM_POOL_MISS, 1.0, MetricUnit::Count).await;

        Ok(LaunchOutcome::ready(&record, startup_time, LaunchSource::OnDemand))
    }

    /// Terminate idle workspaces, then top up the warm pool.
    #[instrument(skip(self))]
    pub async fn monitor(&self) -> Result<MonitorReport> {
        let now = Utc::now();
        let idle_timeout = self.config.idle_timeout();
        let page_size = self.config.scan_page_size.max(1);
        let mut report = MonitorReport::default();
        let mut cursor: Option<String> = None;

        info!(
            "Monitoring workspaces for idle timeout ({} minutes)",
            self.config.idle_timeout_minutes
        );

        loop {
            let page = self.store.running_page(cursor.as_deref(), page_size).await?;
            let last_page = (page.len() as u32) < page_size;
            cursor = page.last().map(|r| r.task_handle.clone());

            for record in page {
                let idle = record.idle_for(now);
                debug!(
                    "User {}: idle for {:.1} minutes",
                    record.owner_id,
                    idle.num_seconds() as f64 / 60.0
                );

                if idle > idle_timeout {
                    info!("Terminating idle workspace for user {}", record.owner_id);
                    if self
                        .terminate(&record.task_handle, IDLE_TIMEOUT_REASON)
                        .await
                        .is_terminated()
                    {
                        report.terminated += 1;
                    } else {
                        report.failed += 1;
                    }
                } else if self.config.reconcile && self.is_gone(&record).await {
                    warn!(
                        "Task {} is no longer running, marking stopped",
                        record.task_handle
                    );
                    self.store
                        .mark_stopped(&record.task_handle, RECONCILED_REASON, Utc::now())
                        .await?;
                    report.reconciled += 1;
                } else {
                    report.active += 1;
                }
            }

            if last_page || cursor.is_none() {
                break;
            }
        }

        report.warm_pool = self.maintain_warm_pool().await?;

        self.metrics
            .record(ACTIVE_WORKSPACES, f64::from(report.active), MetricUnit::Count)
            .await;
        self.metrics
            .record(
                TERMINATED_WORKSPACES,
                f64::from(report.terminated),
                MetricUnit::Count,
            )
            .await;

        Ok(report)
    }

    /// Stop a workspace's task and mark its record stopped.
    ///
    /// Never returns an error: failures come back as
    /// [`TerminationResult::Failed`] and leave the record untouched.
    #[instrument(skip(self))]
    pub async fn terminate(&self, task_handle: &str, reason: &str) -> TerminationResult {
        info!("Terminating workspace: {}, reason: {}", task_handle, reason);

        match self.stop_and_mark(task_handle, reason).await {
            Ok(()) => {
                info!("Workspace terminated: {}", task_handle);
                TerminationResult::Terminated {
                    task_arn: task_handle.to_string(),
                }
            }
            Err(e) => {
                error!("Error terminating workspace {}: {}", task_handle, e);
                TerminationResult::Failed {
                    task_arn: task_handle.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Bring every kind up to the configured warm pool size.
    #[instrument(skip(self))]
    pub async fn maintain_warm_pool(&self) -> Result<WarmPoolReport> {
        info!(
            "Maintaining warm pool (target: {})",
            self.config.warm_pool_size
        );

        let mut statuses = Vec::with_capacity(WorkspaceKind::ALL.len());
        for kind in WorkspaceKind::ALL {
            statuses.push(self.maintain_kind(kind).await?);
        }

        Ok(WarmPoolReport::from_statuses(&statuses))
    }

    /// Top up one kind under its lease. Skips if another maintainer holds it.
    #[instrument(skip(self))]
    pub async fn maintain_kind(&self, kind: WorkspaceKind) -> Result<PoolStatus> {
        let lease = format!("warm_pool:{}", kind);
        let holder = Uuid::new_v4().to_string();

        let acquired = self
            .store
            .try_acquire_lease(&lease, &holder, self.config.lease_ttl(), Utc::now())
            .await?;

        if !acquired {
            info!("Warm pool for {} is being maintained elsewhere, skipping", kind);
            return Ok(PoolStatus {
                kind,
                warm: self.store.count_warm(kind).await?,
                launched: 0,
                skipped: true,
            });
        }

        let result = self.fill_pool(kind).await;

        if let Err(e) = self.store.release_lease(&lease, &holder).await {
            warn!("Failed to release lease {}: {}", lease, e);
        }

        result
    }

    /// Refresh `last_activity` of a running workspace.
    #[instrument(skip(self))]
    pub async fn record_activity(&self, task_handle: &str) -> Result<WorkspaceRecord> {
        if !self.store.touch(task_handle, Utc::now()).await? {
            return Err(ManagerError::NotFound(task_handle.to_string()));
        }

        self.store.get(task_handle).await
    }

    /// Drop records past their expiry.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }

    async fn claim_warm_container(
        &self,
        user_id: &str,
        kind: WorkspaceKind,
    ) -> Result<Option<WorkspaceRecord>> {
        for round in 1..=MAX_CLAIM_ROUNDS {
            let candidates = self.store.find_warm(kind, CLAIM_BATCH).await?;
            if candidates.is_empty() {
                return Ok(None);
            }

            for mut candidate in candidates {
                let now = Utc::now();
                if self
                    .store
                    .claim_warm(&candidate.task_handle, user_id, now)
                    .await?
                {
                    candidate.owner_id = user_id.to_string();
                    candidate.last_activity = now;
                    return Ok(Some(candidate));
                }
                debug!("Warm container {} was claimed concurrently", candidate.task_handle);
            }

            debug!("Claim round {} found no free warm {} container", round, kind);
        }

        Ok(None)
    }

    fn request_replenish(&self, kind: WorkspaceKind) {
        match &self.replenisher {
            Some(queue) => {
                queue.request(kind);
            }
            None => debug!(
                "No replenisher configured, the next maintenance run refills {}",
                kind
            ),
        }
    }

    async fn fill_pool(&self, kind: WorkspaceKind) -> Result<PoolStatus> {
        let current = self.store.count_warm(kind).await?;
        let needed = self.config.warm_pool_size.saturating_sub(current);

        info!(
            "Current warm pool: {}={}, launching {}",
            kind, current, needed
        );

        let launches = (0..needed).map(|_| self.provision(WARM_POOL_OWNER, kind));
        let results = join_all(launches).await;

        let mut launched = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(_) => launched += 1,
                Err(e) => {
                    error!("Failed to launch warm {} container: {}", kind, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(PoolStatus {
            kind,
            warm: current + launched,
            launched,
            skipped: false,
        })
    }

    /// Launch a task, wait for it to run and record it for `owner_id`.
    async fn provision(&self, owner_id: &str, kind: WorkspaceKind) -> Result<WorkspaceRecord> {
        let request = self.run_task_request(owner_id, kind);
        let task_handle = self.orchestrator.run_task(&request).await?;

        let description = self.wait_for_task_running(&task_handle).await?;
        let url = task_url(&description, kind)?;

        let record = WorkspaceRecord::running(
            task_handle,
            owner_id,
            kind,
            url,
            self.config.record_ttl(),
        );

        if let Err(e) = self.store.put(&record).await {
            error!(
                "Task {} is running but could not be recorded: {}",
                record.task_handle, e
            );
            return Err(e);
        }

        Ok(record)
    }

    fn run_task_request(&self, owner_id: &str, kind: WorkspaceKind) -> RunTaskRequest {
        let mut environment = BTreeMap::new();
        environment.insert("USER_ID".to_string(), owner_id.to_string());
        environment.insert("WORKSPACE_TYPE".to_string(), kind.to_string());

        let mut tags = BTreeMap::new();
        tags.insert("user_id".to_string(), owner_id.to_string());
        tags.insert("type".to_string(), kind.to_string());
        tags.insert("managed_by".to_string(), MANAGED_BY.to_string());

        RunTaskRequest {
            cluster: self.config.cluster.clone(),
            task_definition: self.config.task_definition(kind).to_string(),
            network: NetworkConfig {
                subnets: self.config.subnets.clone(),
                security_groups: vec![self.config.security_group.clone()],
                assign_public_ip: false,
            },
            container_name: "workspace".to_string(),
            environment,
            tags,
        }
    }

    async fn wait_for_task_running(&self, task_handle: &str) -> Result<TaskDescription> {
        let timeout = self.config.launch_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(description) = self
                .orchestrator
                .describe_task(&self.config.cluster, task_handle)
                .await?
            {
                match description.last_status {
                    TaskState::Running => return Ok(description),
                    state if state.is_terminal() => {
                        return Err(ManagerError::Orchestrator(format!(
                            "Task {} stopped before reaching RUNNING ({:?})",
                            task_handle, state
                        )))
                    }
                    _ => {}
                }
            }

            if Instant::now() >= deadline {
                return Err(ManagerError::LaunchTimeout {
                    task_handle: task_handle.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            sleep(self.config.poll_interval()).await;
        }
    }

    async fn stop_and_mark(&self, task_handle: &str, reason: &str) -> Result<()> {
        self.orchestrator
            .stop_task(&self.config.cluster, task_handle, reason)
            .await?;

        if !self
            .store
            .mark_stopped(task_handle, reason, Utc::now())
            .await?
        {
            warn!("No running record for terminated task {}", task_handle);
        }

        Ok(())
    }

    /// Whether the orchestrator no longer runs the record's task.
    async fn is_gone(&self, record: &WorkspaceRecord) -> bool {
        match self
            .orchestrator
            .describe_task(&self.config.cluster, &record.task_handle)
            .await
        {
            Ok(Some(description)) => description.last_status.is_terminal(),
            Ok(None) => true,
            Err(e) => {
                warn!("Could not describe task {}: {}", record.task_handle, e);
                false
            }
        }
    }
}

/// `http://<private-ip>:<port>` for a running task.
pub fn task_url(description: &TaskDescription, kind: WorkspaceKind) -> Result<String> {
    description
        .private_ipv4()
        .map(|ip| format!("http://{}:{}", ip, kind.port()))
        .ok_or_else(|| ManagerError::MissingNetworkAddress(description.task_handle.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Attachment;

    #[test]
    fn test_task_url_uses_kind_port() {
        let description = TaskDescription {
            task_handle: "task-1".to_string(),
            last_status: TaskState::Running,
            attachments: vec![Attachment::network_interface("10.0.3.7")],
        };

        assert_eq!(
            task_url(&description, WorkspaceKind::Editor).unwrap(),
            "http://10.0.3.7:8080"
        );
        assert_eq!(
            task_url(&description, WorkspaceKind::Dashboard).unwrap(),
            "http://10.0.3.7:8088"
        );
    }

    #[test]
    fn test_task_url_without_address() {
        let description = TaskDescription {
            task_handle: "task-1".to_string(),
            last_status: TaskState::Running,
            attachments: vec![],
        };

        assert!(matches!(
            task_url(&description, WorkspaceKind::Editor),
            Err(ManagerError::MissingNetworkAddress(_))
        ));
    }

    #[test]
    fn test_warm_pool_report_from_statuses() {
        let report = WarmPoolReport::from_statuses(&[
            PoolStatus {
                kind: WorkspaceKind::Editor,
                warm: 3,
                launched: 2,
                skipped: false,
            },
            PoolStatus {
                kind: WorkspaceKind::Dashboard,
                warm: 1,
                launched: 0,
                skipped: true,
            },
        ]);

        assert_eq!(report.editor_warm, 3);
        assert_eq!(report.dashboard_warm, 1);
        assert_eq!(report.launched, 2);
        assert_eq!(report.skipped, vec![WorkspaceKind::Dashboard]);
    }
}
