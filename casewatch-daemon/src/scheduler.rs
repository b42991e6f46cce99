//! Interval scheduler driving the reconciliation cycle.
//!
//! Each iteration runs one cycle, sleeps the poll interval, then deletes the
//! snapshots the cycle marked closed. A failed cycle sleeps the shorter
//! defer interval and retries without flushing. Both sleeps end early on
//! shutdown; deletions still queued at that point are left to the
//! stale-marker sweep of the next run.

use casewatch_core::{WatchConfig, WatchError, WatchResult};
use casewatch_reconcile::{CycleRunner, CycleSummary};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSchedule {
    /// Sleep between a completed cycle and its deletion flush.
    pub poll_interval: Duration,
    /// Sleep after a failed cycle before retrying.
    pub defer_interval: Duration,
}

impl WatchSchedule {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            defer_interval: config.defer_interval(),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct WatchMetrics {
    /// Completed cycles
    pub cycles: AtomicU64,
    pub events_emitted: AtomicU64,
    pub cases_created: AtomicU64,
    /// Cycles abandoned and retried after the defer interval
    pub deferred_cycles: AtomicU64,
    /// Deferred cycles caused by a malformed case payload
    pub malformed_aborts: AtomicU64,
    pub deletions: AtomicU64,
    pub autosubscribe_failures: AtomicU64,
}

impl WatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WatchMetricsSnapshot {
        WatchMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            cases_created: self.cases_created.load(Ordering::Relaxed),
            deferred_cycles: self.deferred_cycles.load(Ordering::Relaxed),
            malformed_aborts: self.malformed_aborts.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            autosubscribe_failures: self.autosubscribe_failures.load(Ordering::Relaxed),
        }
    }

    fn record_cycle(&self, summary: &CycleSummary) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.events_emitted
            .fetch_add(summary.events as u64, Ordering::Relaxed);
        self.cases_created
            .fetch_add(summary.created as u64, Ordering::Relaxed);
        self.autosubscribe_failures
            .fetch_add(summary.autosubscribe_failures as u64, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &WatchError) {
        self.deferred_cycles.fetch_add(1, Ordering::Relaxed);
        if error.is_malformed() {
            self.malformed_aborts.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchMetricsSnapshot {
    pub cycles: u64,
    pub events_emitted: u64,
    pub cases_created: u64,
    pub deferred_cycles: u64,
    pub malformed_aborts: u64,
    pub deletions: u64,
    pub autosubscribe_failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run cycles until `shutdown_rx` flips to `true` or its sender is dropped.
pub async fn watch_task(
    mut runner: CycleRunner,
    schedule: WatchSchedule,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<WatchMetrics> {
    let metrics = Arc::new(WatchMetrics::new());

    tracing::info!(
        poll_interval_secs = schedule.poll_interval.as_secs_f64(),
        defer_interval_secs = schedule.defer_interval.as_secs_f64(),
        "Case watch started"
    );

    while !*shutdown_rx.borrow() {
        match run_cycle(&mut runner, &metrics).await {
            Ok(_) => {
                if sleep_or_shutdown(schedule.poll_interval, &mut shutdown_rx).await {
                    break;
                }
                flush(&mut runner, &metrics).await;
            }
            Err(_) => {
                if sleep_or_shutdown(schedule.defer_interval, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        events_emitted = snapshot.events_emitted,
        cases_created = snapshot.cases_created,
        deferred_cycles = snapshot.deferred_cycles,
        malformed_aborts = snapshot.malformed_aborts,
        deletions = snapshot.deletions,
        autosubscribe_failures = snapshot.autosubscribe_failures,
        unflushed_deletions = runner.pending_deletions().len(),
        "Case watch stopped"
    );

    metrics
}

/// One cycle, the poll-interval sleep, and the deletion flush. Errors are
/// returned instead of deferred.
pub async fn run_once(
    runner: &mut CycleRunner,
    schedule: WatchSchedule,
    metrics: &WatchMetrics,
) -> WatchResult<CycleSummary> {
    let summary = run_cycle(runner, metrics).await?;
    if !runner.pending_deletions().is_empty() {
        tokio::time::sleep(schedule.poll_interval).await;
    }
    let deleted = runner.flush_deletions().await?;
    metrics.deletions.fetch_add(deleted as u64, Ordering::Relaxed);
    Ok(summary)
}

async fn run_cycle(runner: &mut CycleRunner, metrics: &WatchMetrics) -> WatchResult<CycleSummary> {
    match runner.run_cycle().await {
        Ok(summary) => {
            metrics.record_cycle(&summary);
            if summary.events > 0 || summary.created > 0 || summary.queued_deletions > 0 {
                tracing::info!(
                    live = summary.live_cases,
                    events = summary.events,
                    created = summary.created,
                    queued_deletions = summary.queued_deletions,
                    subscribed = summary.subscribed_emails,
                    "Cycle completed"
                );
            } else {
                tracing::trace!(live = summary.live_cases, "Cycle completed with no changes");
            }
            Ok(summary)
        }
        Err(e) => {
            metrics.record_failure(&e);
            if e.is_transient() {
                tracing::warn!(error = %e, "Cycle deferred after transient failure");
            } else if e.is_malformed() {
                tracing::warn!(error = %e, "Cycle aborted on malformed case");
            } else {
                tracing::error!(error = %e, "Cycle failed");
            }
            Err(e)
        }
    }
}

async fn flush(runner: &mut CycleRunner, metrics: &WatchMetrics) {
    match runner.flush_deletions().await {
        Ok(0) => {}
        Ok(deleted) => {
            metrics
                .deletions
                .fetch_add(deleted as u64, Ordering::Relaxed);
            tracing::info!(deleted, "Deleted closed case snapshots");
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                remaining = runner.pending_deletions().len(),
                "Deletion flush failed; retrying next cycle"
            );
        }
    }
}

/// Returns `true` when shutdown was requested during the sleep.
async fn sleep_or_shutdown(duration: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Shutdown requested");
                    return true;
                }
            }
        }
    }
}
