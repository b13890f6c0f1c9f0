//! Scheduler-driven cycles against the in-memory store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

use oddsheet::engine::scheduler::Scheduler;
use oddsheet::engine::GroupSpec;
use oddsheet::reconciler::{MissingPolicy, ReconcilePolicy};
use oddsheet::registry::EntityRegistry;
use oddsheet::storage::{MemoryStore, SheetLayout, Store};
use oddsheet::types::{FetchError, TaskState, TaskStatus};

use crate::mock_source::{lines, MockSource};

const WAIT: Duration = Duration::from_secs(5);
const HOUR: Duration = Duration::from_secs(3600);

async fn wait_until(
    rx: &mut watch::Receiver<TaskStatus>,
    pred: impl FnMut(&TaskStatus) -> bool,
) -> TaskStatus {
    timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
        .clone()
}

async fn stored_names(store: &MemoryStore, group: &str) -> Vec<String> {
    store
        .read_existing(group, &SheetLayout::default())
        .await
        .unwrap()
        .map(|r| r.names_in_order().map(str::to_string).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_failed_group_recovers_on_next_cycle() {
    let source = Arc::new(MockSource::new([
        Err(FetchError::Transient("HTTP 503 Service Unavailable".into())),
        lines(&["Bet365", "Unibet"]),
    ]));
    let store = Arc::new(MemoryStore::new());
    let mut scheduler = Scheduler::new(source.clone(), store.clone());
    scheduler.register(GroupSpec::new("epl", "epl", HOUR)).unwrap();
    let mut rx = scheduler.subscribe("epl").unwrap();

    let failed = wait_until(&mut rx, |s| s.state == TaskState::Failed).await;
    assert!(failed.message.contains("503"));
    assert!(failed.result.is_none());
    assert_eq!(store.write_count(), 0);

    assert!(scheduler.run_once("epl").await.unwrap());
    let ok = wait_until(&mut rx, |s| s.state == TaskState::Succeeded).await;
    assert_eq!(ok.run_id, 2);
    assert_eq!(ok.progress, 1.0);
    assert_eq!(stored_names(&store, "epl").await, ["Bet365", "Unibet"]);
    assert_eq!(source.calls(), 2);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_operator_order_survives_cycles() {
    let source = Arc::new(MockSource::new([lines(&["Unibet", "Bet365", "Paddy"])]));
    let store = Arc::new(MemoryStore::new());
    store
        .seed(&EntityRegistry::from_ordered("epl", ["Coral", "Bet365", "Unibet"]).unwrap())
        .await;

    let mut scheduler = Scheduler::new(source.clone(), store.clone());
    scheduler.register(GroupSpec::new("epl", "epl", HOUR)).unwrap();
    let mut rx = scheduler.subscribe("epl").unwrap();

    let first = wait_until(&mut rx, |s| s.state == TaskState::Succeeded).await;
    let registry = first.result.unwrap();
    assert_eq!(
        registry.names_in_order().collect::<Vec<_>>(),
        ["Bet365", "Unibet", "Paddy"]
    );
    // Bet365 is second in the fetch, so it carries the second line's odds
    assert_eq!(registry.payload_at(0).unwrap().unwrap().primary, "3.00");

    // Same fetch again: nothing moves
    assert!(scheduler.run_once("epl").await.unwrap());
    wait_until(&mut rx, |s| s.state == TaskState::Succeeded && s.run_id == 2).await;
    assert_eq!(stored_names(&store, "epl").await, ["Bet365", "Unibet", "Paddy"]);
    assert_eq!(store.write_count(), 2);

    let latest = scheduler.registry("epl").await.unwrap().unwrap();
    assert_eq!(*latest, *registry);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_retain_empty_keeps_missing_columns() {
    let source = Arc::new(MockSource::new([lines(&["B", "C", "D"])]));
    let store = Arc::new(MemoryStore::new());
    store
        .seed(&EntityRegistry::from_ordered("nba", ["A", "B", "C"]).unwrap())
        .await;

    let spec = GroupSpec::new("nba", "nba", HOUR).with_policy(ReconcilePolicy {
        preserve_order: true,
        missing: MissingPolicy::RetainEmpty,
    });
    let mut scheduler = Scheduler::new(source, store.clone());
    scheduler.register(spec).unwrap();
    let mut rx = scheduler.subscribe("nba").unwrap();

    let done = wait_until(&mut rx, |s| s.state.is_terminal()).await;
    assert_eq!(done.state, TaskState::Succeeded);

    let rows = store.rows("nba").await.unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["A", "B", "C", "D"]);
    assert!(rows[0].payload.is_none());
    assert!(rows.iter().skip(1).all(|r| r.payload.is_some()));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_run_keeps_pre_run_sheet() {
    let source = Arc::new(MockSource::new([lines(&["Paddy", "Coral"])]).gated());
    let store = Arc::new(MemoryStore::new());
    let before = EntityRegistry::from_ordered("epl", ["Coral", "Bet365"])
        .unwrap()
        .with_payload(0, "4.0", "1.2")
        .unwrap();
    store.seed(&before).await;

    let mut scheduler = Scheduler::new(source.clone(), store.clone());
    scheduler.register(GroupSpec::new("epl", "epl", HOUR)).unwrap();
    let mut rx = scheduler.subscribe("epl").unwrap();

    timeout(WAIT, source.started.notified()).await.unwrap();
    assert!(scheduler.cancel_current("epl").await.unwrap());
    source.release();

    let cancelled = wait_until(&mut rx, |s| s.state.is_terminal()).await;
    assert_eq!(cancelled.state, TaskState::Cancelled);

    let after = store
        .read_existing("epl", &SheetLayout::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after, before);
    assert_eq!(store.write_count(), 0);

    // The cancelled run may have bailed before taking its permit, so
    // the next run can find the gate already open.
    assert!(scheduler.run_once("epl").await.unwrap());
    source.release();
    wait_until(&mut rx, |s| s.run_id == 2 && s.state == TaskState::Succeeded).await;
    assert_eq!(stored_names(&store, "epl").await, ["Coral", "Paddy"]);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_progress_never_moves_backwards_within_a_run() {
    let source = Arc::new(MockSource::new([lines(&["Bet365"])]).gated());
    let mut scheduler = Scheduler::new(source.clone(), Arc::new(MemoryStore::new()));
    scheduler.register(GroupSpec::new("epl", "epl", HOUR)).unwrap();
    let mut rx = scheduler.subscribe("epl").unwrap();

    timeout(WAIT, source.started.notified()).await.unwrap();
    let collector = tokio::spawn(async move {
        let mut seen = vec![rx.borrow_and_update().progress];
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            seen.push(status.progress);
            if status.state.is_terminal() {
                break;
            }
        }
        seen
    });

    source.release();
    let seen = timeout(WAIT, collector).await.unwrap().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {seen:?}");
    assert_eq!(seen.last().copied(), Some(1.0));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_one_failing_group_does_not_stall_another() {
    let failing = Arc::new(MockSource::new([Err(FetchError::Fatal("HTTP 404".into()))]));
    let healthy = Arc::new(MockSource::new([lines(&["Unibet"])]));
    let store = Arc::new(MemoryStore::new());

    // Separate schedulers share the store but nothing else
    let mut bad = Scheduler::new(failing, store.clone());
    let mut good = Scheduler::new(healthy.clone(), store.clone());
    bad.register(GroupSpec::new("bad", "bad", Duration::from_millis(20))).unwrap();
    good.register(GroupSpec::new("good", "good", Duration::from_millis(20))).unwrap();

    let mut rx = good.subscribe("good").unwrap();
    wait_until(&mut rx, |s| s.state == TaskState::Succeeded && s.run_id >= 3).await;

    let bad_status = bad.status("bad").unwrap();
    assert_ne!(bad_status.state, TaskState::Succeeded);
    assert!(store.rows("bad").await.is_none());
    assert_eq!(stored_names(&store, "good").await, ["Unibet"]);

    bad.shutdown().await;
    good.shutdown().await;
}
