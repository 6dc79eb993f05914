//! Integration tests for the idle sweep
//!
//! Tests that monitor terminates workspaces idle past the threshold, leaves
//! the rest running, walks every page and reconciles vanished tasks.

use wsm_manager::manager::{IDLE_TIMEOUT_REASON, RECONCILED_REASON};
use wsm_manager::metrics::{ACTIVE_WORKSPACES, TERMINATED_WORKSPACES};
use wsm_manager::orchestrator::TaskState;
use wsm_manager::test_utils::{fixture_running_record, test_config, FakeOrchestrator, TestHarness};
use wsm_manager::{ManagerConfig, WorkspaceKind, WorkspaceStatus, WARM_POOL_OWNER};

#[tokio::test]
async fn test_monitor_terminates_idle_and_keeps_active() {
    let harness = TestHarness::new(test_config()).await;
    fixture_running_record(&harness.store, "task-idle", "alice", WorkspaceKind::Editor, 45).await;
    fixture_running_record(&harness.store, "task-busy", "bob", WorkspaceKind::Editor, 10).await;

    let report = harness.manager.monitor().await.expect("Monitor failed");

    assert_eq!(report.active, 1);
    assert_eq!(report.terminated, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(
        harness.orchestrator.stop_calls(),
        vec![("task-idle".to_string(), IDLE_TIMEOUT_REASON.to_string())]
    );
    assert_eq!(
        harness.store.get("task-idle").await.unwrap().status,
        WorkspaceStatus::Stopped
    );
    assert_eq!(
        harness.store.get("task-busy").await.unwrap().status,
        WorkspaceStatus::Running
    );

    assert_eq!(harness.metrics.values(ACTIVE_WORKSPACES), vec![1.0]);
    assert_eq!(harness.metrics.values(TERMINATED_WORKSPACES), vec![1.0]);
}

#[tokio::test]
async fn test_monitor_respects_configured_threshold() {
    let config = ManagerConfig {
        idle_timeout_minutes: 60,
        ..test_config()
    };
    let harness = TestHarness::new(config).await;
    fixture_running_record(&harness.store, "task-1", "alice", WorkspaceKind::Editor, 45).await;

    let report = harness.manager.monitor().await.expect("Monitor failed");

    assert_eq!(report.active, 1);
    assert_eq!(report.terminated, 0);
    assert!(harness.orchestrator.stop_calls().is_empty());
}

#[tokio::test]
async fn test_monitor_counts_failed_terminations() {
    let orchestrator = FakeOrchestrator::new().failing_stops();
    let harness = TestHarness::with_orchestrator(test_config(), orchestrator).await;
    fixture_running_record(&harness.store, "task-idle", "alice", WorkspaceKind::Editor, 90).await;

    let report = harness.manager.monitor().await.expect("Monitor failed");

    assert_eq!(report.terminated, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(
        harness.store.get("task-idle").await.unwrap().status,
        WorkspaceStatus::Running
    );
}

#[tokio::test]
async fn test_monitor_visits_every_page() {
    let config = ManagerConfig {
        scan_page_size: 2,
        ..test_config()
    };
    let harness = TestHarness::new(config).await;
    for i in 0..5 {
        fixture_running_record(
            &harness.store,
            &format!("task-idle-{}", i),
            &format!("user-{}", i),
            WorkspaceKind::Editor,
            120,
        )
        .await;
    }
    fixture_running_record(&harness.store, "task-zz-busy", "user-x", WorkspaceKind::Editor, 1).await;

    let report = harness.manager.monitor().await.expect("Monitor failed");

    assert_eq!(report.terminated, 5);
    assert_eq!(report.active, 1);
    assert_eq!(harness.orchestrator.stop_calls().len(), 5);
}

#[tokio::test]
async fn test_monitor_sweeps_idle_warm_containers() {
    let harness = TestHarness::new(test_config()).await;
    fixture_running_record(&harness.store, "task-warm", WARM_POOL_OWNER, WorkspaceKind::Editor, 31)
        .await;

    let report = harness.manager.monitor().await.expect("Monitor failed");

    assert_eq!(report.terminated, 1);
}

#[tokio::test]
async fn test_monitor_reconciles_vanished_tasks() {
    let config = ManagerConfig {
        reconcile: true,
        ..test_config()
    };
    let harness = TestHarness::new(config).await;
    fixture_running_record(&harness.store, "task-alive", "alice", WorkspaceKind::Editor, 5).await;
    fixture_running_record(&harness.store, "task-dead", "bob", WorkspaceKind::Editor, 5).await;
    fixture_running_record(&harness.store, "task-unknown", "carol", WorkspaceKind::Editor, 5).await;
    harness
        .orchestrator
        .register_task("task-alive", TaskState::Running);
    harness
        .orchestrator
        .register_task("task-dead", TaskState::Stopped);

    let report = harness.manager.monitor().await.expect("Monitor failed");

    assert_eq!(report.active, 1);
    assert_eq!(report.reconciled, 2);
    assert_eq!(report.terminated, 0);
    assert!(harness.orchestrator.stop_calls().is_empty());

    let dead = harness.store.get("task-dead").await.unwrap();
    assert_eq!(dead.status, WorkspaceStatus::Stopped);
    assert_eq!(dead.stop_reason.as_deref(), Some(RECONCILED_REASON));
    assert_eq!(
        harness.store.get("task-unknown").await.unwrap().status,
        WorkspaceStatus::Stopped
    );
}

#[tokio::test]
async fn test_monitor_refills_warm_pool() {
    let config = ManagerConfig {
        warm_pool_size: 1,
        ..test_config()
    };
    let harness = TestHarness::new(config).await;

    let report = harness.manager.monitor().await.expect("Monitor failed");

    assert_eq!(report.warm_pool.launched, 2);
    assert_eq!(report.warm_pool.editor_warm, 1);
    assert_eq!(report.warm_pool.dashboard_warm, 1);
}
