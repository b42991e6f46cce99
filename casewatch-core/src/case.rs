//! Normalized support case records.
//!
//! Everything the reconciler compares lives here. Records arrive from the
//! case source already normalized; anything that could not be normalized
//! never reaches these types.

use crate::identity::{CaseNumber, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A raw field value that does not map onto the case model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unrecognized {field} value: {value:?}")]
pub struct FieldParseError {
    pub field: &'static str,
    pub value: String,
}

// ============================================================================
// STATE
// ============================================================================

/// Lifecycle state of a case as far as the watcher cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseState {
    Open,
    Closed,
}

impl CaseState {
    /// Support API states that count as open.
    pub const OPEN_API_STATES: [&'static str; 5] = [
        "NEW",
        "ASSIGNED",
        "IN_PROGRESS_GOOGLE_SUPPORT",
        "ACTION_REQUIRED",
        "SOLUTION_PROVIDED",
    ];

    pub fn from_api_str(raw: &str) -> Result<Self, FieldParseError> {
        if raw == "CLOSED" {
            return Ok(Self::Closed);
        }
        if Self::OPEN_API_STATES.contains(&raw) {
            return Ok(Self::Open);
        }
        Err(FieldParseError {
            field: "state",
            value: raw.to_string(),
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

// ============================================================================
// PRIORITY
// ============================================================================

/// Case priority, P0 (most urgent) through P4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Priority(u8);

impl Priority {
    pub const LOWEST_ORDINAL: u8 = 4;

    pub fn new(ordinal: u8) -> Option<Self> {
        (ordinal <= Self::LOWEST_ORDINAL).then_some(Self(ordinal))
    }

    pub fn ordinal(&self) -> u8 {
        self.0
    }

    /// Human label, e.g. `P1`.
    pub fn label(&self) -> String {
        format!("P{}", self.0)
    }
}

/// Renders the ordinal alone; this is what priority events carry.
impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = FieldParseError;

    /// Accepts `P0`..`P4`, the older severity spelling `S0`..`S4`, and bare digits.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix(['P', 'p', 'S', 's'])
            .unwrap_or(trimmed);
        digits
            .parse::<u8>()
            .ok()
            .and_then(Priority::new)
            .ok_or_else(|| FieldParseError {
                field: "priority",
                value: raw.to_string(),
            })
    }
}

impl TryFrom<String> for Priority {
    type Error = FieldParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.label()
    }
}

// ============================================================================
// COMMENTS
// ============================================================================

/// Who wrote a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Set when the author is a member of the vendor's support staff.
    #[serde(default)]
    pub google_support: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub creator: CommentAuthor,
    pub body: String,
    pub create_time: Timestamp,
}

impl Comment {
    pub fn is_from_support(&self) -> bool {
        self.creator.google_support
    }
}

/// Sort comments newest first, the order every consumer expects.
pub fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by(|a, b| b.create_time.cmp(&a.create_time));
}

// ============================================================================
// CASE RECORD
// ============================================================================

/// One open (or just-closed) support case in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_number: CaseNumber,
    /// Resource name of the case's parent, e.g. `projects/123`.
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub display_name: String,
    pub state: CaseState,
    pub priority: Priority,
    pub escalated: bool,
    pub update_time: Timestamp,
    /// Newest first.
    #[serde(default)]
    pub comment_list: Vec<Comment>,
}

impl CaseRecord {
    pub fn newest_comment(&self) -> Option<&Comment> {
        self.comment_list.first()
    }

    /// Full support API resource name for this case.
    pub fn resource_name(&self) -> String {
        if self.parent.is_empty() {
            format!("cases/{}", self.case_number)
        } else {
            format!("{}/cases/{}", self.parent, self.case_number)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_state_from_api_str() {
        for raw in CaseState::OPEN_API_STATES {
            assert_eq!(CaseState::from_api_str(raw), Ok(CaseState::Open));
        }
        assert_eq!(CaseState::from_api_str("CLOSED"), Ok(CaseState::Closed));
        let err = CaseState::from_api_str("STATE_UNSPECIFIED").unwrap_err();
        assert_eq!(err.field, "state");
    }

    #[test]
    fn test_priority_parsing_variants() {
        assert_eq!("P1".parse::<Priority>().unwrap().ordinal(), 1);
        assert_eq!("S3".parse::<Priority>().unwrap().ordinal(), 3);
        assert_eq!("0".parse::<Priority>().unwrap().ordinal(), 0);
        assert!("P5".parse::<Priority>().is_err());
        assert!("PRIORITY_UNSPECIFIED".parse::<Priority>().is_err());
        assert!("".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_display_and_label() {
        let p = Priority::new(2).unwrap();
        assert_eq!(p.to_string(), "2");
        assert_eq!(p.label(), "P2");
    }

    #[test]
    fn test_priority_serde_uses_label() {
        let p = Priority::new(1).unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"P1\"");
        let back: Priority = serde_json::from_str("\"P1\"").unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_resource_name() {
        let record = CaseRecord {
            case_number: "42".to_string(),
            parent: "projects/demo".to_string(),
            display_name: String::new(),
            state: CaseState::Open,
            priority: Priority::new(3).unwrap(),
            escalated: false,
            update_time: crate::closing_sentinel(),
            comment_list: vec![],
        };
        assert_eq!(record.resource_name(), "projects/demo/cases/42");
    }
}
