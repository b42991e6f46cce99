//! Identity and time types shared across the workspace.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-write token used to decide the first writer of a case version.
/// UUIDv7 keeps tokens roughly sortable by creation time in the store.
pub type Guid = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Trailing numeric identifier of a case resource name.
pub type CaseNumber = String;

/// Unix seconds for 2100-12-31T23:59:59Z.
const CLOSING_SENTINEL_SECS: i64 = 4_133_980_799;

/// Generate a new UUIDv7 write token.
pub fn new_guid() -> Guid {
    Uuid::now_v7()
}

/// The far-future update time stamped on a snapshot once its case has
/// disappeared from the open set. Never a legitimate case update time.
pub fn closing_sentinel() -> Timestamp {
    DateTime::<Utc>::from_timestamp(CLOSING_SENTINEL_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
