//! Casewatch Reconcile - Change Detection Core
//!
//! Each cycle diffs the stored snapshots against the live open cases and
//! announces what changed. Several watcher processes may share one store;
//! the store's first-writer marker decides which of them announces a given
//! change, so every change is announced at most once.
//!
//! A case that disappears is first rewritten with the closing sentinel and
//! announced, then deleted one sleep later by [`CycleRunner::flush_deletions`].

pub mod auto_subscribe;
pub mod cycle;
pub mod plan;
pub mod reconciler;

pub use auto_subscribe::{
    subscription_comment, AutoSubscribeOutcome, AutoSubscriber, AUTO_SUBSCRIBE_AUTHOR,
    MAX_FOLDER_DEPTH,
};
pub use cycle::{CycleRunner, CycleSummary};
pub use plan::{classify, plan, PlannedUpdate, ReconcilePlan};
pub use reconciler::{CycleReport, Reconciler, StoreOp};
