//! Casewatch Core - Case Types and Adapter Contracts
//!
//! Pure data structures shared by every other crate, plus the async traits
//! for the external systems the reconciler talks to. No I/O lives here.

mod adapters;
mod case;
mod config;
mod error;
mod event;
mod hierarchy;
mod identity;
mod snapshot;

pub use adapters::{
    CaseSource, ChannelPoster, CommentRequest, NotificationSink, ResourceHierarchy,
    SupportActions,
};
pub use case::{
    sort_newest_first, CaseRecord, CaseState, Comment, CommentAuthor, FieldParseError, Priority,
};
pub use config::{
    AccessToken, CaseChannelBinding, RetryConfig, SlackConfig, WatchConfig, WebhookConfig,
    DEFAULT_DEFER_SECS, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RESOURCE_MANAGER_URL, DEFAULT_SLACK_API_URL,
    DEFAULT_STORE_PATH, DEFAULT_STORE_SIZE_MB, DEFAULT_SUPPORT_API_URL, MAX_STORE_SIZE_MB,
};
pub use error::{
    ConfigError, HierarchyError, NotifyError, SourceError, StorageError, WatchError, WatchResult,
};
pub use event::{EventKind, FieldChange, NotificationEvent};
pub use hierarchy::{
    project_from_parent, Ancestry, AssetKind, FolderInfo, ParentRef, ProjectInfo, TrackedAsset,
};
pub use identity::{closing_sentinel, new_guid, CaseNumber, Guid, Timestamp};
pub use snapshot::{mark_for_closure, FirstWriter, Snapshot};
