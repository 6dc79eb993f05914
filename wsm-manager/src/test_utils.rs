//! Test doubles and fixtures shared by this crate's tests and by wsm-api.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::manager::WorkspaceManager;
use crate::metrics::{Metric, MetricsSink};
use crate::orchestrator::{
    Attachment, ContainerOrchestrator, RunTaskRequest, TaskDescription, TaskState,
};
use crate::record::{WorkspaceKind, WorkspaceRecord};
use crate::store::WorkspaceStore;

/// Helper to create an in-memory test database with migrations applied
pub async fn create_test_db() -> SqlitePool {
    // One connection: every query sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Config with fast polling and reconciliation off.
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        cluster: "test-cluster".to_string(),
        editor_task_definition: "editor:test".to_string(),
        dashboard_task_definition: "dashboard:test".to_string(),
        subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
        security_group: "sg-test".to_string(),
        warm_pool_size: 0,
        idle_timeout_minutes: 30,
        launch_timeout_secs: 1,
        poll_interval_ms: 5,
        record_ttl_days: 7,
        lease_ttl_secs: 300,
        scan_page_size: 100,
        metrics_namespace: "Test/Workspaces".to_string(),
        reconcile: false,
        ..ManagerConfig::default()
    }
}

#[derive(Debug, Clone)]
struct FakeTask {
    state: TaskState,
    polls_remaining: u32,
    ip: String,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u32,
    tasks: HashMap<String, FakeTask>,
    run_requests: Vec<RunTaskRequest>,
    stop_calls: Vec<(String, String)>,
    describe_calls: usize,
    polls_until_running: u32,
    fail_runs: bool,
    fail_stops: bool,
    never_running: bool,
    without_address: bool,
}

/// In-memory orchestrator recording every call.
#[derive(Debug, Default)]
pub struct FakeOrchestrator {
    state: Mutex<FakeState>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks report PENDING for `polls` describes before RUNNING.
    pub fn with_polls_until_running(self, polls: u32) -> Self {
        self.state.lock().unwrap().polls_until_running = polls;
        self
    }

    pub fn failing_runs(self) -> Self {
        self.state.lock().unwrap().fail_runs = true;
        self
    }

    pub fn failing_stops(self) -> Self {
        self.state.lock().unwrap().fail_stops = true;
        self
    }

    pub fn never_running(self) -> Self {
        self.state.lock().unwrap().never_running = true;
        self
    }

    pub fn without_address(self) -> Self {
        self.state.lock().unwrap().without_address = true;
        self
    }

    /// Make the orchestrator aware of a task created outside `run_task`.
    pub fn register_task(&self, task_handle: &str, state: TaskState) {
        self.state.lock().unwrap().tasks.insert(
            task_handle.to_string(),
            FakeTask {
                state,
                polls_remaining: 0,
                ip: "10.0.9.9".to_string(),
            },
        );
    }

    pub fn run_requests(&self) -> Vec<RunTaskRequest> {
        self.state.lock().unwrap().run_requests.clone()
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().unwrap().run_requests.len()
    }

    pub fn run_count_for(&self, kind: WorkspaceKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .run_requests
            .iter()
            .filter(|r| r.tags.get("type").map(String::as_str) == Some(kind.as_str()))
            .count()
    }

    pub fn stop_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().stop_calls.clone()
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }

    /// Total orchestrator calls of any kind.
    pub fn call_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.run_requests.len() + state.stop_calls.len() + state.describe_calls
    }
}

#[async_trait]
impl ContainerOrchestrator for FakeOrchestrator {
    async fn run_task(&self, request: &RunTaskRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.run_requests.push(request.clone());

        if state.fail_runs {
            return Err(ManagerError::Orchestrator("run task rejected".to_string()));
        }

        state.next_id += 1;
        let n = state.next_id;
        let task_handle = format!("task-{:04}", n);
        let polls_remaining = state.polls_until_running;
        state.tasks.insert(
            task_handle.clone(),
            FakeTask {
                state: TaskState::Pending,
                polls_remaining,
                ip: format!("10.0.{}.{}", n / 250, n % 250 + 1),
            },
        );

        Ok(task_handle)
    }

    async fn stop_task(&self, _cluster: &str, task_handle: &str, reason: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .stop_calls
            .push((task_handle.to_string(), reason.to_string()));

        if state.fail_stops {
            return Err(ManagerError::Orchestrator("stop task rejected".to_string()));
        }

        if let Some(task) = state.tasks.get_mut(task_handle) {
            task.state = TaskState::Stopped;
        }

        Ok(())
    }

    async fn describe_task(
        &self,
        _cluster: &str,
        task_handle: &str,
    ) -> Result<Option<TaskDescription>> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        let never_running = state.never_running;
        let without_address = state.without_address;

        let Some(task) = state.tasks.get_mut(task_handle) else {
            return Ok(None);
        };

        if task.state == TaskState::Pending && !never_running {
            if task.polls_remaining == 0 {
                task.state = TaskState::Running;
            } else {
                task.polls_remaining -= 1;
            }
        }

        let attachments = if without_address {
            Vec::new()
        } else {
            vec![Attachment::network_interface(task.ip.clone())]
        };

        Ok(Some(TaskDescription {
            task_handle: task_handle.to_string(),
            last_status: task.state,
            attachments,
        }))
    }
}

/// Keeps every metric in memory.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    metrics: Mutex<Vec<Metric>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().unwrap().clone()
    }

    pub fn values(&self, name: &str) -> Vec<f64> {
        self.metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.value)
            .collect()
    }
}

#[async_trait]
impl MetricsSink for MemoryMetricsSink {
    async fn put_metric(&self, metric: Metric) -> Result<()> {
        self.metrics.lock().unwrap().push(metric);
        Ok(())
    }
}

/// A manager wired to fakes, with handles to inspect them.
pub struct TestHarness {
    pub manager: WorkspaceManager,
    pub store: WorkspaceStore,
    pub orchestrator: Arc<FakeOrchestrator>,
    pub metrics: Arc<MemoryMetricsSink>,
}

impl TestHarness {
    pub async fn new(config: ManagerConfig) -> Self {
        Self::with_orchestrator(config, FakeOrchestrator::new()).await
    }

    pub async fn with_orchestrator(config: ManagerConfig, orchestrator: FakeOrchestrator) -> Self {
        let pool = create_test_db().await;
        let store = WorkspaceStore::new(pool);
        let orchestrator = Arc::new(orchestrator);
        let metrics = Arc::new(MemoryMetricsSink::new());
        let manager = WorkspaceManager::new(
            config,
            store.clone(),
            orchestrator.clone(),
            metrics.clone(),
        );

        Self {
            manager,
            store,
            orchestrator,
            metrics,
        }
    }
}

/// Fixture: insert a running record whose last activity was `idle_minutes` ago.
pub async fn fixture_running_record(
    store: &WorkspaceStore,
    task_handle: &str,
    owner_id: &str,
    kind: WorkspaceKind,
    idle_minutes: i64,
) -> WorkspaceRecord {
    let mut record = WorkspaceRecord::running(
        task_handle,
        owner_id,
        kind,
        format!("http://10.0.0.1:{}", kind.port()),
        Duration::days(7),
    );
    record.last_activity = Utc::now() - Duration::minutes(idle_minutes);

    store
        .put(&record)
        .await
        .expect("Failed to insert fixture record");

    record
}
