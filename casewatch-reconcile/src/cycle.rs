//! One polling cycle: fetch, reconcile, auto-subscribe, and the deferred
//! deletion queue carried to the next cycle.

use crate::auto_subscribe::AutoSubscriber;
use crate::reconciler::{CycleReport, Reconciler};
use casewatch_core::{CaseNumber, CaseSource, NotificationSink, WatchResult};
use casewatch_storage::SnapshotStore;
use std::sync::Arc;

/// Counts from one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub live_cases: usize,
    pub events: usize,
    pub created: usize,
    pub queued_deletions: usize,
    pub subscribed_emails: usize,
    pub autosubscribe_failures: usize,
}

pub struct CycleRunner {
    org_id: String,
    source: Arc<dyn CaseSource>,
    store: Arc<dyn SnapshotStore>,
    reconciler: Reconciler,
    subscriber: Option<AutoSubscriber>,
    pending_deletions: Vec<CaseNumber>,
    last_report: Option<CycleReport>,
}

impl CycleRunner {
    pub fn new(
        org_id: impl Into<String>,
        source: Arc<dyn CaseSource>,
        store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let reconciler = Reconciler::new(store.clone(), sink);
        Self {
            org_id: org_id.into(),
            source,
            store,
            reconciler,
            subscriber: None,
            pending_deletions: Vec::new(),
            last_report: None,
        }
    }

    pub fn with_auto_subscriber(mut self, subscriber: AutoSubscriber) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Cases waiting for [`flush_deletions`](Self::flush_deletions).
    pub fn pending_deletions(&self) -> &[CaseNumber] {
        &self.pending_deletions
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Run one cycle. A failed fetch returns before the store is touched.
    pub async fn run_cycle(&mut self) -> WatchResult<CycleSummary> {
        let live = self.source.search_open(&self.org_id).await?;
        let previous = self.store.list_all().await?;

        tracing::debug!(
            org_id = %self.org_id,
            live = live.len(),
            tracked = previous.len(),
            "Reconciling cases"
        );

        let report = self.reconciler.reconcile(&previous, &live).await?;

        let mut summary = CycleSummary {
            live_cases: live.len(),
            events: report.events.len(),
            created: report.created.len(),
            queued_deletions: report.pending_deletions.len(),
            ..CycleSummary::default()
        };

        if let Some(subscriber) = &self.subscriber {
            for case in &report.created {
                match subscriber.auto_subscribe(case).await {
                    Ok(outcome) => {
                        summary.subscribed_emails += outcome.added.len();
                        summary.autosubscribe_failures += outcome.failures;
                    }
                    Err(e) => {
                        summary.autosubscribe_failures += 1;
                        tracing::warn!(
                            case_number = %case.case_number,
                            error = %e,
                            "Auto-subscription skipped"
                        );
                    }
                }
            }
        }

        for case_number in &report.pending_deletions {
            if !self.pending_deletions.contains(case_number) {
                self.pending_deletions.push(case_number.clone());
            }
        }
        self.last_report = Some(report);

        Ok(summary)
    }

    /// Delete every queued snapshot. On failure the undeleted cases stay
    /// queued for the next flush.
    pub async fn flush_deletions(&mut self) -> WatchResult<usize> {
        let queued = std::mem::take(&mut self.pending_deletions);
        let mut deleted = 0;

        for (index, case_number) in queued.iter().enumerate() {
            if let Err(e) = self.store.delete(case_number).await {
                tracing::warn!(
                    case_number = %case_number,
                    error = %e,
                    "Snapshot deletion failed"
                );
                self.pending_deletions.extend(queued[index..].iter().cloned());
                return Err(e.into());
            }
            tracing::debug!(case_number = %case_number, "Deleted closed case snapshot");
            deleted += 1;
        }

        Ok(deleted)
    }
}

impl std::fmt::Debug for CycleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleRunner")
            .field("org_id", &self.org_id)
            .field("auto_subscribe", &self.subscriber.is_some())
            .field("pending_deletions", &self.pending_deletions)
            .finish()
    }
}
