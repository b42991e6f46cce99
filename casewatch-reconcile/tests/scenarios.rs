//! End-to-end cycles against the in-memory store.

use casewatch_core::{EventKind, SourceError};
use casewatch_reconcile::CycleRunner;
use casewatch_test_utils::{CaseBuilder, MockStore, RecordingNotifier, ScriptedCaseSource};
use std::sync::Arc;

struct Harness {
    store: Arc<MockStore>,
    sink: Arc<RecordingNotifier>,
    source: Arc<ScriptedCaseSource>,
    runner: CycleRunner,
}

fn harness() -> Harness {
    let store = Arc::new(MockStore::new());
    let sink = Arc::new(RecordingNotifier::new());
    let source = Arc::new(ScriptedCaseSource::new());
    let runner = CycleRunner::new("42", source.clone(), store.clone(), sink.clone());
    Harness {
        store,
        sink,
        source,
        runner,
    }
}

impl Harness {
    /// Script the next fetch, run a cycle, then flush as the scheduler does
    /// after its sleep.
    async fn cycle(&mut self, cases: Vec<casewatch_core::CaseRecord>) {
        self.source.push(Ok(cases));
        self.runner.run_cycle().await.unwrap();
        self.runner.flush_deletions().await.unwrap();
    }
}

#[tokio::test]
async fn priority_change_emits_single_event() {
    let mut h = harness();
    h.cycle(vec![CaseBuilder::new("C1").priority(2).build()]).await;
    assert!(h.sink.events().is_empty());

    h.cycle(vec![CaseBuilder::new("C1").updated_at(1).priority(1).build()])
        .await;

    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].case_number, "C1");
    assert_eq!(events[0].kind, EventKind::Priority);
    assert_eq!(events[0].payload, "1");
}

#[tokio::test]
async fn closure_is_announced_then_deleted_a_cycle_later() {
    let mut h = harness();
    h.cycle(vec![CaseBuilder::new("C2").build()]).await;

    // Cycle N: absent. Marked and announced, not deleted yet.
    h.source.push(Ok(vec![]));
    let summary = h.runner.run_cycle().await.unwrap();
    assert_eq!(summary.events, 1);
    let snapshot = h.store.snapshot("C2").expect("still stored after first absence");
    assert!(snapshot.is_marked_for_closure());
    assert_eq!(h.runner.pending_deletions(), ["C2".to_string()]);

    // Sleep elapses, then the deferred deletion runs.
    assert_eq!(h.runner.flush_deletions().await.unwrap(), 1);
    assert!(h.store.snapshot("C2").is_none());

    // Cycle N+1: still absent, nothing more happens.
    h.cycle(vec![]).await;

    let closed = h.sink.events_of(EventKind::Closed);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].case_number, "C2");
    assert_eq!(closed[0].payload, "");
}

#[tokio::test]
async fn unchanged_update_time_never_notifies() {
    let mut h = harness();
    h.cycle(vec![CaseBuilder::new("C1").priority(3).build()]).await;
    h.cycle(vec![CaseBuilder::new("C1")
        .priority(0)
        .escalated(true)
        .support_comment("glitch", 1)
        .build()])
        .await;
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn customer_comment_is_filtered() {
    let mut h = harness();
    h.cycle(vec![CaseBuilder::new("C1").build()]).await;
    h.cycle(vec![CaseBuilder::new("C1")
        .updated_at(1)
        .customer_comment("any update?", 1)
        .build()])
        .await;
    assert!(h.sink.events().is_empty());

    h.cycle(vec![CaseBuilder::new("C1")
        .updated_at(2)
        .customer_comment("any update?", 1)
        .support_comment("working on it", 2)
        .build()])
        .await;
    let comments = h.sink.events_of(EventKind::Comment);
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].payload, "working on it");
}

#[tokio::test]
async fn bundled_changes_fire_independently() {
    let mut h = harness();
    h.cycle(vec![CaseBuilder::new("C1").escalated(true).build()]).await;
    h.cycle(vec![CaseBuilder::new("C1")
        .updated_at(5)
        .priority(0)
        .escalated(false)
        .support_comment("fixed", 5)
        .build()])
        .await;

    let kinds: Vec<EventKind> = h.sink.events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Comment, EventKind::Priority, EventKind::DeEscalated]
    );
}

#[tokio::test]
async fn malformed_fetch_aborts_without_writes() {
    let mut h = harness();
    h.cycle(vec![CaseBuilder::new("C1").build()]).await;
    let before = h.store.snapshot("C1").unwrap();

    h.source.push(Err(SourceError::Malformed {
        case_number: Some("C9".to_string()),
        reason: "unknown state".to_string(),
    }));
    let err = h.runner.run_cycle().await.unwrap_err();
    assert!(err.is_malformed());
    assert_eq!(h.store.snapshot("C1").unwrap(), before);
    assert!(h.store.snapshot("C9").is_none());
    assert!(h.sink.events().is_empty());

    // Next cycle proceeds normally.
    h.cycle(vec![CaseBuilder::new("C1").updated_at(1).escalated(true).build()])
        .await;
    assert_eq!(h.sink.events_of(EventKind::Escalated).len(), 1);
}

#[tokio::test]
async fn reopened_case_is_tracked_again() {
    let mut h = harness();
    h.cycle(vec![CaseBuilder::new("C1").build()]).await;
    h.cycle(vec![]).await;
    assert!(h.store.snapshot("C1").is_none());

    h.cycle(vec![CaseBuilder::new("C1").updated_at(10).build()])
        .await;
    assert!(h.store.snapshot("C1").is_some());

    // Closing again is announced again: the old markers went with the delete.
    h.cycle(vec![]).await;
    assert_eq!(h.sink.events_of(EventKind::Closed).len(), 2);
}
