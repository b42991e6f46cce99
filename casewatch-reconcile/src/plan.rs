//! Pure diff between stored snapshots and the live case set.
//!
//! Nothing here touches the store. The plan is applied by
//! [`Reconciler::apply`](crate::Reconciler::apply), which adds the
//! first-writer gate.

use casewatch_core::{CaseNumber, CaseRecord, FieldChange, Snapshot};
use std::collections::{HashMap, HashSet};

/// A tracked case whose update time moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub previous: Snapshot,
    pub current: CaseRecord,
    /// May be empty: the snapshot is still rewritten so the stored update
    /// time follows the source.
    pub changes: Vec<FieldChange>,
}

/// Everything one cycle has to do, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Tracked cases missing from the live set, not yet marked.
    pub closures: Vec<Snapshot>,
    /// Cases already marked for closure and still missing. Queued for
    /// deletion without another notification.
    pub sweeps: Vec<CaseNumber>,
    pub updates: Vec<PlannedUpdate>,
    /// Live cases with no snapshot at all.
    pub creations: Vec<CaseRecord>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.closures.is_empty()
            && self.sweeps.is_empty()
            && self.updates.is_empty()
            && self.creations.is_empty()
    }

    /// Number of notifications the plan would emit if this process won
    /// every first-writer check.
    pub fn max_events(&self) -> usize {
        self.closures.len() + self.updates.iter().map(|u| u.changes.len()).sum::<usize>()
    }
}

/// Diff `previous` snapshots against `live` cases.
///
/// Live records reporting a closed state are treated as absent. When the
/// store holds duplicates for one case only the first is considered.
pub fn plan(previous: &[Snapshot], live: &[CaseRecord]) -> ReconcilePlan {
    let live_by_number: HashMap<&str, &CaseRecord> = live
        .iter()
        .filter(|record| record.state.is_open())
        .map(|record| (record.case_number.as_str(), record))
        .collect();

    let mut plan = ReconcilePlan::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for snapshot in previous {
        let case_number = snapshot.case_number();
        if !seen.insert(case_number) {
            continue;
        }

        match live_by_number.get(case_number) {
            None if snapshot.is_marked_for_closure() => {
                plan.sweeps.push(case_number.to_string());
            }
            None => plan.closures.push(snapshot.clone()),
            Some(current) if current.update_time != snapshot.update_time() => {
                plan.updates.push(PlannedUpdate {
                    previous: snapshot.clone(),
                    current: (*current).clone(),
                    changes: classify(&snapshot.record, current),
                });
            }
            Some(_) => {}
        }
    }

    let mut created: HashSet<&str> = HashSet::new();
    for record in live.iter().filter(|r| r.state.is_open()) {
        let case_number = record.case_number.as_str();
        if !seen.contains(case_number) && created.insert(case_number) {
            plan.creations.push(record.clone());
        }
    }

    plan
}

/// Field changes between two versions of one case.
///
/// A comment change counts only when the comment lists differ and the
/// newest comment was written by support staff.
pub fn classify(previous: &CaseRecord, current: &CaseRecord) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if previous.comment_list != current.comment_list {
        if let Some(newest) = current.newest_comment() {
            if newest.is_from_support() {
                changes.push(FieldChange::Comment {
                    body: newest.body.clone(),
                });
            }
        }
    }

    if previous.priority != current.priority {
        changes.push(FieldChange::Priority {
            from: previous.priority,
            to: current.priority,
        });
    }

    if previous.escalated != current.escalated {
        changes.push(FieldChange::Escalation {
            escalated: current.escalated,
        });
    }

    changes
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use casewatch_core::new_guid;
    use casewatch_test_utils::generators::{arb_case_set, arb_comments};
    use casewatch_test_utils::CaseBuilder;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_every_case_lands_in_one_bucket(
            previous in arb_case_set(),
            live in arb_case_set(),
        ) {
            let snapshots: Vec<Snapshot> = previous
                .iter()
                .cloned()
                .map(|record| Snapshot { record, guid: new_guid() })
                .collect();
            let plan = plan(&snapshots, &live);

            for record in &live {
                let tracked = previous.iter().find(|p| p.case_number == record.case_number);
                let in_updates = plan.updates.iter().any(|u| u.current.case_number == record.case_number);
                let in_creations = plan.creations.iter().any(|c| c.case_number == record.case_number);
                match tracked {
                    None => prop_assert!(in_creations && !in_updates),
                    Some(p) => {
                        prop_assert!(!in_creations);
                        prop_assert_eq!(in_updates, p.update_time != record.update_time);
                    }
                }
            }
            for record in &previous {
                let absent = !live.iter().any(|l| l.case_number == record.case_number);
                let closing = plan.closures.iter().any(|s| s.case_number() == record.case_number);
                prop_assert_eq!(absent, closing);
            }
        }

        #[test]
        fn prop_identical_records_never_change(comments in arb_comments()) {
            let mut record = CaseBuilder::new("1").build();
            record.comment_list = comments;
            prop_assert!(classify(&record, &record).is_empty());
        }
    }
}
