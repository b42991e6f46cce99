//! Notification events and the field changes that produce them.

use crate::case::Priority;
use crate::identity::CaseNumber;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change announced to subscribers. There is no "opened" kind; new
/// cases only trigger auto-subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Closed,
    Comment,
    Priority,
    Escalated,
    DeEscalated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Closed => "closed",
            EventKind::Comment => "comment",
            EventKind::Priority => "priority",
            EventKind::Escalated => "escalated",
            EventKind::DeEscalated => "de-escalated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message for the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub case_number: CaseNumber,
    pub kind: EventKind,
    pub payload: String,
}

impl NotificationEvent {
    pub fn closed(case_number: impl Into<CaseNumber>) -> Self {
        Self {
            case_number: case_number.into(),
            kind: EventKind::Closed,
            payload: String::new(),
        }
    }
}

/// A single observable difference between two versions of a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldChange {
    /// A new support-authored comment is now the newest one.
    Comment { body: String },
    Priority { from: Priority, to: Priority },
    Escalation { escalated: bool },
}

impl FieldChange {
    pub fn kind(&self) -> EventKind {
        match self {
            FieldChange::Comment { .. } => EventKind::Comment,
            FieldChange::Priority { .. } => EventKind::Priority,
            FieldChange::Escalation { escalated: true } => EventKind::Escalated,
            FieldChange::Escalation { escalated: false } => EventKind::DeEscalated,
        }
    }

    pub fn payload(&self) -> String {
        match self {
            FieldChange::Comment { body } => body.clone(),
            FieldChange::Priority { to, .. } => to.to_string(),
            FieldChange::Escalation { escalated } => escalated.to_string(),
        }
    }

    pub fn to_event(&self, case_number: &str) -> NotificationEvent {
        NotificationEvent {
            case_number: case_number.to_string(),
            kind: self.kind(),
            payload: self.payload(),
        }
    }
}
