//! Stored snapshots and first-writer markers.

use crate::case::CaseRecord;
use crate::identity::{closing_sentinel, Guid, Timestamp};
use serde::{Deserialize, Serialize};

/// The last case record persisted by any process, with the token of the
/// write that stored it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub record: CaseRecord,
    pub guid: Guid,
}

impl Snapshot {
    pub fn case_number(&self) -> &str {
        &self.record.case_number
    }

    pub fn update_time(&self) -> Timestamp {
        self.record.update_time
    }

    /// A snapshot whose update time is the closing sentinel has already been
    /// announced as closed and is waiting for deletion.
    pub fn is_marked_for_closure(&self) -> bool {
        self.record.update_time == Self::closing_marker()
    }

    pub fn closing_marker() -> Timestamp {
        closing_sentinel()
    }
}

/// Copy of `record` stamped with the closing sentinel.
pub fn mark_for_closure(record: &CaseRecord) -> CaseRecord {
    let mut marked = record.clone();
    marked.update_time = closing_sentinel();
    marked
}

/// The write that first registered a given `(case_number, update_time)`.
/// Once recorded it is never replaced by a later write of the same version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstWriter {
    pub guid: Guid,
    pub record: CaseRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{CaseState, Priority};
    use crate::identity::new_guid;
    use chrono::TimeZone;

    fn record() -> CaseRecord {
        CaseRecord {
            case_number: "100".to_string(),
            parent: "projects/p".to_string(),
            display_name: "disk full".to_string(),
            state: CaseState::Open,
            priority: Priority::new(2).unwrap(),
            escalated: false,
            update_time: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            comment_list: vec![],
        }
    }

    #[test]
    fn test_mark_for_closure_only_touches_update_time() {
        let original = record();
        let marked = mark_for_closure(&original);
        assert_eq!(marked.update_time, closing_sentinel());
        assert_eq!(marked.case_number, original.case_number);
        assert_eq!(marked.priority, original.priority);

        let snapshot = Snapshot {
            record: marked,
            guid: new_guid(),
        };
        assert!(snapshot.is_marked_for_closure());
    }

    #[test]
    fn test_fresh_snapshot_not_marked() {
        let snapshot = Snapshot {
            record: record(),
            guid: new_guid(),
        };
        assert!(!snapshot.is_marked_for_closure());
        assert_eq!(snapshot.case_number(), "100");
    }
}
