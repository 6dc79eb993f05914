//! Integration tests for warm pool maintenance and replenishment

use chrono::{Duration, Utc};
use wsm_manager::replenish::{run_replenisher, ReplenishQueue};
use wsm_manager::test_utils::{fixture_running_record, test_config, FakeOrchestrator, TestHarness};
use wsm_manager::{ManagerConfig, WorkspaceKind, WARM_POOL_OWNER};

fn pool_config(size: u32) -> ManagerConfig {
    ManagerConfig {
        warm_pool_size: size,
        ..test_config()
    }
}

#[tokio::test]
async fn test_warm_pool_launches_only_the_shortfall() {
    let harness = TestHarness::new(pool_config(3)).await;
    fixture_running_record(&harness.store, "warm-e1", WARM_POOL_OWNER, WorkspaceKind::Editor, 0).await;
    fixture_running_record(&harness.store, "warm-e2", WARM_POOL_OWNER, WorkspaceKind::Editor, 0).await;
    // Assigned containers are not part of the pool
    fixture_running_record(&harness.store, "owned-d1", "alice", WorkspaceKind::Dashboard, 0).await;

    let report = harness
        .manager
        .maintain_warm_pool()
        .await
        .expect("Warm pool maintenance failed");

    assert_eq!(harness.orchestrator.run_count_for(WorkspaceKind::Editor), 1);
    assert_eq!(harness.orchestrator.run_count_for(WorkspaceKind::Dashboard), 3);
    assert_eq!(report.editor_warm, 3);
    assert_eq!(report.dashboard_warm, 3);
    assert_eq!(report.launched, 4);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_warm_pool_at_or_above_target_launches_nothing() {
    let harness = TestHarness::new(pool_config(1)).await;
    fixture_running_record(&harness.store, "warm-e1", WARM_POOL_OWNER, WorkspaceKind::Editor, 0).await;
    fixture_running_record(&harness.store, "warm-e2", WARM_POOL_OWNER, WorkspaceKind::Editor, 0).await;
    fixture_running_record(&harness.store, "warm-d1", WARM_POOL_OWNER, WorkspaceKind::Dashboard, 0).await;

    let report = harness
        .manager
        .maintain_warm_pool()
        .await
        .expect("Warm pool maintenance failed");

    assert_eq!(harness.orchestrator.run_count(), 0);
    assert_eq!(report.editor_warm, 2);
    assert_eq!(report.dashboard_warm, 1);
    assert_eq!(report.launched, 0);
}

#[tokio::test]
async fn test_warm_containers_are_recorded_unassigned() {
    let harness = TestHarness::new(pool_config(2)).await;

    harness
        .manager
        .maintain_kind(WorkspaceKind::Editor)
        .await
        .expect("Warm pool maintenance failed");

    let warm = harness
        .store
        .find_warm(WorkspaceKind::Editor, 10)
        .await
        .unwrap();
    assert_eq!(warm.len(), 2);
    assert!(warm.iter().all(|r| r.is_warm()));

    for request in harness.orchestrator.run_requests() {
        assert_eq!(
            request.tags.get("user_id").map(String::as_str),
            Some(WARM_POOL_OWNER)
        );
    }
}

#[tokio::test]
async fn test_warm_pool_skips_kind_with_held_lease() {
    let harness = TestHarness::new(pool_config(2)).await;
    harness
        .store
        .try_acquire_lease("warm_pool:editor", "other-maintainer", Duration::seconds(300), Utc::now())
        .await
        .unwrap();

    let report = harness
        .manager
        .maintain_warm_pool()
        .await
        .expect("Warm pool maintenance failed");

    assert_eq!(harness.orchestrator.run_count_for(WorkspaceKind::Editor), 0);
    assert_eq!(harness.orchestrator.run_count_for(WorkspaceKind::Dashboard), 2);
    assert_eq!(report.skipped, vec![WorkspaceKind::Editor]);
    assert_eq!(report.editor_warm, 0);
}

#[tokio::test]
async fn test_warm_pool_releases_lease_after_run() {
    let harness = TestHarness::new(pool_config(1)).await;

    harness
        .manager
        .maintain_warm_pool()
        .await
        .expect("Warm pool maintenance failed");

    assert!(harness
        .store
        .try_acquire_lease("warm_pool:editor", "next", Duration::seconds(300), Utc::now())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_warm_pool_failure_propagates_and_releases_lease() {
    let orchestrator = FakeOrchestrator::new().failing_runs();
    let harness = TestHarness::with_orchestrator(pool_config(2), orchestrator).await;

    let result = harness.manager.maintain_warm_pool().await;

    assert!(result.is_err());
    assert!(harness
        .store
        .try_acquire_lease("warm_pool:editor", "next", Duration::seconds(300), Utc::now())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_replenisher_refills_requested_kind() {
    let harness = TestHarness::new(pool_config(1)).await;
    let (queue, rx) = ReplenishQueue::channel(8);
    let worker = tokio::spawn(run_replenisher(harness.manager.clone(), rx));

    assert!(queue.request(WorkspaceKind::Dashboard));
    assert!(queue.request(WorkspaceKind::Dashboard));
    drop(queue);
    worker.await.expect("Replenish worker panicked");

    assert_eq!(harness.orchestrator.run_count_for(WorkspaceKind::Dashboard), 1);
    assert_eq!(harness.orchestrator.run_count_for(WorkspaceKind::Editor), 0);
    assert_eq!(
        harness.store.count_warm(WorkspaceKind::Dashboard).await.unwrap(),
        1
    );
}
