//! Operator actions flowing through the store to published status
//!
//! Run with: cargo test --test action_processing

mod common;

use common::*;
use shardmigrate::coordinator::{Action, ActionKind, Member, Mode, StatusKind};
use shardmigrate::store::{action_path, stat_path, CoordinationStore, MemStore};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

async fn started(delegate: Arc<MockDelegate>) -> (Arc<MemStore>, shardmigrate::Coordinator) {
    let store = Arc::new(MemStore::new());
    let mut coordinator = coordinator(store.clone(), delegate, vec![Member::new(81, "shard1")]);
    coordinator.start().await.unwrap();
    (store, coordinator)
}

async fn status_is(store: &MemStore, mode: Mode, status: StatusKind) -> bool {
    let current = read_status(store, 81).await;
    current.mode == mode && current.status == status
}

#[tokio::test]
async fn test_noop_touches_nothing() {
    let delegate = MockDelegate::new();
    let (store, coordinator) = started(delegate.clone()).await;
    let before = store.get(&stat_path(SERVICE, 81)).await.unwrap();

    write_action(store.as_ref(), &Action::noop(81)).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(delegate.calls().is_empty());
    assert_eq!(store.get(&stat_path(SERVICE, 81)).await.unwrap(), before);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_start_slave_then_sync_progress() {
    let delegate = MockDelegate::new();
    let (store, coordinator) = started(delegate.clone()).await;

    write_action(store.as_ref(), &action(81, ActionKind::StartSlave, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Slave, StatusKind::Running)).await);
    assert_eq!(delegate.call_count("start_observing"), 1);

    delegate.set_approaching(true);
    assert!(eventually(WAIT, || status_is(&store, Mode::Slave, StatusKind::Approached)).await);

    delegate.set_synced(true);
    assert!(eventually(WAIT, || status_is(&store, Mode::Slave, StatusKind::Synced)).await);

    // Mode only changes through actions
    let snapshot = coordinator.members().get(81).unwrap().snapshot();
    assert_eq!(snapshot.status.mode, Mode::Slave);
    assert!(snapshot.published);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_sync_check_error_fails_in_place() {
    let delegate = MockDelegate::new();
    delegate.fail_polls(Some("replication link down"));
    let (store, coordinator) = started(delegate.clone()).await;

    write_action(store.as_ref(), &action(81, ActionKind::StartSlave, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Slave, StatusKind::Failed)).await);
    let failed = read_status(store.as_ref(), 81).await;
    assert!(failed
        .reason
        .as_deref()
        .is_some_and(|r| r.contains("replication link down")));

    // A later successful poll clears the failure
    delegate.fail_polls(None);
    delegate.set_synced(true);
    assert!(eventually(WAIT, || status_is(&store, Mode::Slave, StatusKind::Synced)).await);
    assert_eq!(read_status(store.as_ref(), 81).await.reason, None);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_watcher_ignores_other_modes() {
    let delegate = MockDelegate::new();
    delegate.set_synced(true);
    let (store, coordinator) = started(delegate.clone()).await;

    write_action(store.as_ref(), &action(81, ActionKind::Migrate1, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Migrating1, StatusKind::Running)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(status_is(&store, Mode::Migrating1, StatusKind::Running).await);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_migration_sequence() {
    let delegate = MockDelegate::new();
    let (store, coordinator) = started(delegate.clone()).await;

    let steps = [
        (ActionKind::StartSlave, Mode::Slave),
        (ActionKind::Migrate1, Mode::Migrating1),
        (ActionKind::Migrate2, Mode::Migrating2),
        (ActionKind::Migrate3, Mode::Normal),
    ];
    for (kind, mode) in steps {
        write_action(store.as_ref(), &action(81, kind, "shard2")).await;
        assert!(
            eventually(WAIT, || status_is(&store, mode, StatusKind::Running)).await,
            "{} should lead to {}",
            kind,
            mode
        );
    }

    assert_eq!(
        delegate.calls(),
        vec![
            "start_observing",
            "migrate_buckets",
            "set_buckets",
            "set_buckets"
        ]
    );
    coordinator.stop().await;
}

#[tokio::test]
async fn test_stop_slave_returns_to_normal() {
    let delegate = MockDelegate::new();
    let (store, coordinator) = started(delegate.clone()).await;

    write_action(store.as_ref(), &action(81, ActionKind::StartSlave, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Slave, StatusKind::Running)).await);
    write_action(store.as_ref(), &action(81, ActionKind::StopSlave, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Normal, StatusKind::Running)).await);
    assert_eq!(delegate.call_count("stop_observing"), 1);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_delegate_failure_publishes_failed() {
    let delegate = MockDelegate::new();
    delegate.fail("migrate_buckets", "destination refused");
    let (store, coordinator) = started(delegate.clone()).await;

    write_action(store.as_ref(), &action(81, ActionKind::Migrate1, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Normal, StatusKind::Failed)).await);
    let status = read_status(store.as_ref(), 81).await;
    assert!(status
        .reason
        .as_deref()
        .is_some_and(|r| r.contains("destination refused")));

    // Retrying the same command after the cause is fixed succeeds
    delegate.clear_failures();
    write_action(store.as_ref(), &action(81, ActionKind::Migrate1, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Migrating1, StatusKind::Running)).await);
    assert_eq!(read_status(store.as_ref(), 81).await.reason, None);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_invalid_arguments_fail_without_delegate_call() {
    let delegate = MockDelegate::new();
    let (store, coordinator) = started(delegate.clone()).await;

    let mut bad = action(81, ActionKind::Migrate1, "shard2");
    bad.args.range_start = 100;
    bad.args.range_stop = 10;
    write_action(store.as_ref(), &bad).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Normal, StatusKind::Failed)).await);

    let mut missing = action(81, ActionKind::StartSlave, "shard2");
    missing.args.to_shard = None;
    write_action(store.as_ref(), &missing).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(delegate.calls().is_empty());
    coordinator.stop().await;
}

#[tokio::test]
async fn test_malformed_notification_is_dropped() {
    let delegate = MockDelegate::new();
    let (store, coordinator) = started(delegate.clone()).await;
    let before = store.get(&stat_path(SERVICE, 81)).await.unwrap();

    store
        .set(&action_path(SERVICE, 81), b"{\"memberId\": 81, \"action\":")
        .await
        .unwrap();
    store
        .set(&action_path(SERVICE, 81), b"{\"memberId\": 81, \"action\": \"TELEPORT\"}")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(delegate.calls().is_empty());
    assert_eq!(store.get(&stat_path(SERVICE, 81)).await.unwrap(), before);

    // The listener is still alive afterwards
    write_action(store.as_ref(), &action(81, ActionKind::StartSlave, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Slave, StatusKind::Running)).await);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_action_for_other_member_is_dropped() {
    let delegate = MockDelegate::new();
    let (store, coordinator) = started(delegate.clone()).await;

    let stray = action(99, ActionKind::Migrate1, "shard2");
    store
        .set(
            &action_path(SERVICE, 81),
            &serde_json::to_vec(&stray).unwrap(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(delegate.calls().is_empty());
    assert!(coordinator.members().get(81).unwrap().snapshot().action.is_noop());
    coordinator.stop().await;
}

#[tokio::test]
async fn test_failed_start_slave_is_not_polled() {
    let delegate = MockDelegate::new();
    delegate.fail("start_observing", "source unreachable");
    delegate.set_synced(true);
    let (store, coordinator) = started(delegate.clone()).await;

    write_action(store.as_ref(), &action(81, ActionKind::StartSlave, "shard2")).await;
    assert!(eventually(WAIT, || status_is(&store, Mode::Normal, StatusKind::Failed)).await);

    // Slaves report synced, but the member never entered SLAVE mode
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(status_is(&store, Mode::Normal, StatusKind::Failed).await);
    coordinator.stop().await;
}
