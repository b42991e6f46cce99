//! Contracts for the external collaborators the reconciler drives.
//!
//! Implementations live in `casewatch-providers` and `casewatch-notify`;
//! scripted fakes live in `casewatch-test-utils`.

use crate::case::CaseRecord;
use crate::error::{HierarchyError, NotifyError, SourceError, WatchResult};
use crate::event::NotificationEvent;
use crate::hierarchy::{FolderInfo, ProjectInfo};
use async_trait::async_trait;

/// Fetches the current set of open cases.
#[async_trait]
pub trait CaseSource: Send + Sync {
    /// All open cases of the organization, fully normalized. One malformed
    /// record fails the whole call.
    async fn search_open(&self, org_id: &str) -> Result<Vec<CaseRecord>, SourceError>;
}

/// Read access to the cloud resource tree.
#[async_trait]
pub trait ResourceHierarchy: Send + Sync {
    /// Parent resource path of a case, e.g. `projects/123`.
    async fn get_parent(&self, case_number: &str) -> Result<String, HierarchyError>;

    async fn get_project(&self, project_id: &str) -> Result<ProjectInfo, HierarchyError>;

    async fn get_folder(&self, folder_id: &str) -> Result<FolderInfo, HierarchyError>;
}

/// A comment to post on a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRequest {
    pub channel_id: String,
    pub case_number: String,
    pub body: String,
    pub user_id: String,
    pub author_label: String,
    /// Also announce the comment in the channel.
    pub notify: bool,
}

impl CommentRequest {
    /// Body as posted to the case, signed with the author label.
    pub fn signed_body(&self) -> String {
        if self.author_label.is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n- {}", self.body, self.author_label)
        }
    }
}

/// Write operations on cases.
#[async_trait]
pub trait SupportActions: Send + Sync {
    async fn add_comment(&self, request: &CommentRequest) -> WatchResult<()>;

    /// Add `emails` to the case's subscribers. Returns only the addresses
    /// that were not already subscribed.
    async fn subscribe_emails(
        &self,
        channel_id: &str,
        case_number: &str,
        emails: &[String],
        user_id: &str,
    ) -> WatchResult<Vec<String>>;
}

/// Best-effort delivery of case events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Free-form messages to a chat channel.
#[async_trait]
pub trait ChannelPoster: Send + Sync {
    async fn post_to_channel(&self, channel_id: &str, text: &str) -> Result<(), NotifyError>;
}
