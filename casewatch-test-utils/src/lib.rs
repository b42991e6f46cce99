//! Casewatch Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - `CaseBuilder` fixtures with a fixed clock
//! - Scripted and fake adapters for every external collaborator
//! - A recording notification sink
//! - Proptest generators for case records

// Re-export mock storage from its source crate
pub use casewatch_storage::{AssetRegistry, CaseChannels, MockStore, SnapshotStore};

// Re-export core types for convenience
pub use casewatch_core::{
    AssetKind, CaseRecord, CaseSource, CaseState, Comment, CommentAuthor, CommentRequest,
    EventKind, FolderInfo, HierarchyError, NotificationEvent, NotificationSink, NotifyError,
    Priority, ProjectInfo, ResourceHierarchy, Snapshot, SourceError, SupportActions, Timestamp,
    TrackedAsset, WatchError, WatchResult,
};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

// ============================================================================
// FIXTURES
// ============================================================================

/// Fixed base instant plus `minutes`. Every fixture uses this clock.
pub fn ts(minutes: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn support_author() -> CommentAuthor {
    CommentAuthor {
        display_name: "Google Support".to_string(),
        email: None,
        google_support: true,
    }
}

pub fn customer_author() -> CommentAuthor {
    CommentAuthor {
        display_name: "Customer".to_string(),
        email: Some("customer@example.com".to_string()),
        google_support: false,
    }
}

/// Builder for `CaseRecord` fixtures.
#[derive(Debug, Clone)]
pub struct CaseBuilder {
    record: CaseRecord,
}

impl CaseBuilder {
    /// Open P2 case at `ts(0)` under `projects/test-project`.
    pub fn new(case_number: &str) -> Self {
        Self {
            record: CaseRecord {
                case_number: case_number.to_string(),
                parent: "projects/test-project".to_string(),
                display_name: format!("Case {}", case_number),
                state: CaseState::Open,
                priority: Priority::new(2).unwrap(),
                escalated: false,
                update_time: ts(0),
                comment_list: Vec::new(),
            },
        }
    }

    pub fn updated_at(mut self, minutes: i64) -> Self {
        self.record.update_time = ts(minutes);
        self
    }

    pub fn priority(mut self, ordinal: u8) -> Self {
        self.record.priority = Priority::new(ordinal).unwrap();
        self
    }

    pub fn escalated(mut self, escalated: bool) -> Self {
        self.record.escalated = escalated;
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.record.parent = parent.to_string();
        self
    }

    pub fn state(mut self, state: CaseState) -> Self {
        self.record.state = state;
        self
    }

    /// Add a comment; the list is kept newest first.
    pub fn comment(mut self, author: CommentAuthor, body: &str, minutes: i64) -> Self {
        self.record.comment_list.push(Comment {
            creator: author,
            body: body.to_string(),
            create_time: ts(minutes),
        });
        casewatch_core::sort_newest_first(&mut self.record.comment_list);
        self
    }

    pub fn support_comment(self, body: &str, minutes: i64) -> Self {
        self.comment(support_author(), body, minutes)
    }

    pub fn customer_comment(self, body: &str, minutes: i64) -> Self {
        self.comment(customer_author(), body, minutes)
    }

    pub fn build(self) -> CaseRecord {
        self.record
    }
}

pub fn tracked_asset(channel: &str, kind: AssetKind, id: &str, cc: &[&str]) -> TrackedAsset {
    TrackedAsset {
        channel_id: channel.to_string(),
        asset_kind: kind,
        asset_id: id.to_string(),
        cc_list: cc.iter().map(|s| s.to_string()).collect(),
        user_id: format!("U-{}", channel),
    }
}

// ============================================================================
// SCRIPTED CASE SOURCE
// ============================================================================

/// Replays a queue of search results; the last one repeats once the queue
/// runs dry.
#[derive(Debug, Default)]
pub struct ScriptedCaseSource {
    script: Mutex<VecDeque<Result<Vec<CaseRecord>, SourceError>>>,
    last: Mutex<Option<Result<Vec<CaseRecord>, SourceError>>>,
    calls: Mutex<usize>,
}

impl ScriptedCaseSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_cases(self, cases: Vec<CaseRecord>) -> Self {
        self.push(Ok(cases));
        self
    }

    pub fn then_error(self, error: SourceError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, result: Result<Vec<CaseRecord>, SourceError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CaseSource for ScriptedCaseSource {
    async fn search_open(&self, _org_id: &str) -> Result<Vec<CaseRecord>, SourceError> {
        *self.calls.lock().unwrap() += 1;
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last.clone().unwrap_or_else(|| Ok(Vec::new())),
        }
    }
}

// ============================================================================
// FAKE HIERARCHY
// ============================================================================

/// In-memory resource tree.
#[derive(Debug, Default)]
pub struct FakeHierarchy {
    case_parents: HashMap<String, String>,
    projects: HashMap<String, ProjectInfo>,
    folders: HashMap<String, FolderInfo>,
    lookups: Mutex<Vec<String>>,
}

impl FakeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_parent(mut self, case_number: &str, parent: &str) -> Self {
        self.case_parents
            .insert(case_number.to_string(), parent.to_string());
        self
    }

    /// `parent` is `organizations/{id}`, `folders/{id}` or empty.
    pub fn with_project(mut self, id: &str, project_id: &str, parent: &str) -> Self {
        self.projects.insert(
            id.to_string(),
            ProjectInfo {
                name: format!("projects/{}", id),
                project_id: project_id.to_string(),
                parent: parent.to_string(),
            },
        );
        self
    }

    pub fn with_folder(mut self, id: &str, parent: &str) -> Self {
        self.folders.insert(
            id.to_string(),
            FolderInfo {
                name: format!("folders/{}", id),
                parent: parent.to_string(),
            },
        );
        self
    }

    /// Resources looked up so far, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    fn record(&self, resource: String) {
        self.lookups.lock().unwrap().push(resource);
    }
}

#[async_trait]
impl ResourceHierarchy for FakeHierarchy {
    async fn get_parent(&self, case_number: &str) -> Result<String, HierarchyError> {
        self.record(format!("cases/{}", case_number));
        self.case_parents
            .get(case_number)
            .cloned()
            .ok_or_else(|| HierarchyError::Lookup {
                resource: format!("cases/{}", case_number),
                reason: "not found".to_string(),
            })
    }

    async fn get_project(&self, project_id: &str) -> Result<ProjectInfo, HierarchyError> {
        self.record(format!("projects/{}", project_id));
        self.projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| HierarchyError::Lookup {
                resource: format!("projects/{}", project_id),
                reason: "not found".to_string(),
            })
    }

    async fn get_folder(&self, folder_id: &str) -> Result<FolderInfo, HierarchyError> {
        self.record(format!("folders/{}", folder_id));
        self.folders
            .get(folder_id)
            .cloned()
            .ok_or_else(|| HierarchyError::Lookup {
                resource: format!("folders/{}", folder_id),
                reason: "not found".to_string(),
            })
    }
}

// ============================================================================
// FAKE SUPPORT ACTIONS
// ============================================================================

/// Records comments and keeps a per-case subscriber list.
#[derive(Debug, Default)]
pub struct FakeSupportActions {
    subscribers: Mutex<HashMap<String, Vec<String>>>,
    comments: Mutex<Vec<CommentRequest>>,
    failing_channels: HashSet<String>,
}

impl FakeSupportActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriptions through `channel_id` fail.
    pub fn failing_channel(mut self, channel_id: &str) -> Self {
        self.failing_channels.insert(channel_id.to_string());
        self
    }

    pub fn with_subscribers(self, case_number: &str, emails: &[&str]) -> Self {
        self.subscribers.lock().unwrap().insert(
            case_number.to_string(),
            emails.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn subscribers(&self, case_number: &str) -> Vec<String> {
        self.subscribers
            .lock()
            .unwrap()
            .get(case_number)
            .cloned()
            .unwrap_or_default()
    }

    pub fn comments(&self) -> Vec<CommentRequest> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl SupportActions for FakeSupportActions {
    async fn add_comment(&self, request: &CommentRequest) -> WatchResult<()> {
        self.comments.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn subscribe_emails(
        &self,
        channel_id: &str,
        case_number: &str,
        emails: &[String],
        _user_id: &str,
    ) -> WatchResult<Vec<String>> {
        if self.failing_channels.contains(channel_id) {
            return Err(WatchError::Source(SourceError::Rejected {
                service: "fake".to_string(),
                status: 403,
                message: format!("channel {} not permitted", channel_id),
            }));
        }
        let mut subscribers = self.subscribers.lock().unwrap();
        let current = subscribers.entry(case_number.to_string()).or_default();
        let mut added = Vec::new();
        for email in emails {
            let known = current.iter().any(|e| e.eq_ignore_ascii_case(email));
            if !known {
                current.push(email.clone());
                added.push(email.clone());
            }
        }
        Ok(added)
    }
}

// ============================================================================
// RECORDING NOTIFIER
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records events but reports every delivery as failed.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<NotificationEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(NotifyError::Delivery {
                sink: "recording".to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_priority() -> impl Strategy<Value = Priority> {
        (0u8..=Priority::LOWEST_ORDINAL).prop_map(|p| Priority::new(p).unwrap())
    }

    /// Minutes after the fixture epoch.
    pub fn arb_minutes() -> impl Strategy<Value = i64> {
        0i64..10_000
    }

    pub fn arb_author() -> impl Strategy<Value = CommentAuthor> {
        any::<bool>().prop_map(|support| {
            if support {
                support_author()
            } else {
                customer_author()
            }
        })
    }

    pub fn arb_comments() -> impl Strategy<Value = Vec<Comment>> {
        prop::collection::vec((arb_author(), "[a-z ]{1,24}", arb_minutes()), 0..4).prop_map(
            |items| {
                let mut comments: Vec<Comment> = items
                    .into_iter()
                    .map(|(creator, body, minutes)| Comment {
                        creator,
                        body,
                        create_time: ts(minutes),
                    })
                    .collect();
                casewatch_core::sort_newest_first(&mut comments);
                comments
            },
        )
    }

    pub fn arb_case(case_number: String) -> impl Strategy<Value = CaseRecord> {
        (arb_priority(), any::<bool>(), arb_minutes(), arb_comments()).prop_map(
            move |(priority, escalated, minutes, comment_list)| CaseRecord {
                case_number: case_number.clone(),
                parent: "projects/test-project".to_string(),
                display_name: String::new(),
                state: CaseState::Open,
                priority,
                escalated,
                update_time: ts(minutes),
                comment_list,
            },
        )
    }

    /// Open cases with distinct case numbers drawn from a small pool so
    /// consecutive draws overlap.
    pub fn arb_case_set() -> impl Strategy<Value = Vec<CaseRecord>> {
        prop::collection::btree_set(0u32..12, 0..8).prop_flat_map(|numbers| {
            numbers
                .into_iter()
                .map(|n| arb_case(format!("{}", 1000 + n)))
                .collect::<Vec<_>>()
        })
    }
}
