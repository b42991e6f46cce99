//! First-writer gated application of a [`ReconcilePlan`].

use crate::plan::{plan, PlannedUpdate, ReconcilePlan};
use casewatch_core::{
    mark_for_closure, CaseNumber, CaseRecord, Guid, NotificationEvent, NotificationSink, Snapshot,
    Timestamp, WatchResult,
};
use casewatch_storage::SnapshotStore;
use std::sync::Arc;

/// A store mutation performed while applying a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Snapshot written for a new or updated case.
    Write { case_number: CaseNumber, guid: Guid },
    /// Snapshot rewritten with the closing sentinel.
    MarkClosed { case_number: CaseNumber, guid: Guid },
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events this process won the right to announce, in emission order.
    pub events: Vec<NotificationEvent>,
    /// Newly tracked cases, for auto-subscription.
    pub created: Vec<CaseRecord>,
    /// Cases to delete after the next sleep.
    pub pending_deletions: Vec<CaseNumber>,
    pub store_ops: Vec<StoreOp>,
}

/// Applies plans against the shared store and announces the changes this
/// process wrote first.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn SnapshotStore>,
    sink: Arc<dyn NotificationSink>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SnapshotStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Diff and apply in one step.
    pub async fn reconcile(
        &self,
        previous: &[Snapshot],
        live: &[CaseRecord],
    ) -> WatchResult<CycleReport> {
        self.apply(plan(previous, live)).await
    }

    /// Closures first, then updates, then creations. A store failure aborts
    /// the remainder; events already sent stay sent.
    pub async fn apply(&self, plan: ReconcilePlan) -> WatchResult<CycleReport> {
        let mut report = CycleReport::default();

        for snapshot in &plan.closures {
            self.apply_closure(snapshot, &mut report).await?;
        }

        for case_number in plan.sweeps {
            tracing::info!(
                case_number = %case_number,
                "Stale closure marker queued for deletion"
            );
            report.pending_deletions.push(case_number);
        }

        for update in &plan.updates {
            self.apply_update(update, &mut report).await?;
        }

        for record in plan.creations {
            let guid = self.store.write(&record).await?;
            tracing::info!(
                case_number = %record.case_number,
                guid = %guid,
                "Tracking new case"
            );
            report.store_ops.push(StoreOp::Write {
                case_number: record.case_number.clone(),
                guid,
            });
            report.created.push(record);
        }

        Ok(report)
    }

    async fn apply_closure(
        &self,
        snapshot: &Snapshot,
        report: &mut CycleReport,
    ) -> WatchResult<()> {
        let case_number = snapshot.case_number().to_string();
        let marked = mark_for_closure(&snapshot.record);
        let guid = self.store.write(&marked).await?;
        report.store_ops.push(StoreOp::MarkClosed {
            case_number: case_number.clone(),
            guid,
        });

        if self
            .is_first_writer(&case_number, marked.update_time, guid)
            .await?
        {
            self.emit(NotificationEvent::closed(case_number.clone()), report)
                .await;
        }

        // Deletion is idempotent; every racer queues it.
        report.pending_deletions.push(case_number);
        Ok(())
    }

    async fn apply_update(
        &self,
        update: &PlannedUpdate,
        report: &mut CycleReport,
    ) -> WatchResult<()> {
        let case_number = update.current.case_number.as_str();
        let guid = self.store.write(&update.current).await?;
        report.store_ops.push(StoreOp::Write {
            case_number: case_number.to_string(),
            guid,
        });

        if update.changes.is_empty() {
            tracing::debug!(
                case_number = %case_number,
                "Case updated without announceable changes"
            );
            return Ok(());
        }

        // One check per case gates every change of this update.
        if !self
            .is_first_writer(case_number, update.current.update_time, guid)
            .await?
        {
            return Ok(());
        }

        for change in &update.changes {
            self.emit(change.to_event(case_number), report).await;
        }
        Ok(())
    }

    async fn is_first_writer(
        &self,
        case_number: &str,
        update_time: Timestamp,
        guid: Guid,
    ) -> WatchResult<bool> {
        match self.store.first_writer(case_number, update_time).await? {
            Some(first) if first.guid == guid => Ok(true),
            Some(first) => {
                tracing::debug!(
                    case_number = %case_number,
                    guid = %guid,
                    first_guid = %first.guid,
                    "Another writer owns this change"
                );
                Ok(false)
            }
            None => {
                tracing::warn!(
                    case_number = %case_number,
                    guid = %guid,
                    "No first writer recorded after write"
                );
                Ok(false)
            }
        }
    }

    async fn emit(&self, event: NotificationEvent, report: &mut CycleReport) {
        tracing::info!(
            case_number = %event.case_number,
            kind = %event.kind,
            "Sending notification"
        );
        if let Err(e) = self.sink.notify(&event).await {
            tracing::warn!(
                case_number = %event.case_number,
                kind = %event.kind,
                error = %e,
                "Notification delivery failed"
            );
        }
        report.events.push(event);
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}
