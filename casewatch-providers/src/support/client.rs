//! Cloud Support API client: case search, comments, subscriptions.

use super::normalize::{normalize_case, split_case_name};
use super::types::{
    ApiCase, ApiComment, CreateCommentRequest, ListCommentsResponse, SearchCasesResponse,
    SubscriberPatch,
};
use crate::transport::ApiTransport;
use async_trait::async_trait;
use casewatch_core::{
    CaseRecord, CaseSource, ChannelPoster, CommentRequest, SourceError, SupportActions,
    WatchConfig, WatchResult,
};
use reqwest::Method;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

const SERVICE: &str = "cloudsupport";
const API_VERSION: &str = "v2beta";
const PAGE_SIZE: &str = "100";
const MAX_PAGES: usize = 1000;

/// Page-token bookkeeping for list calls. Stops on an empty or repeated
/// token, or after `MAX_PAGES` pages.
#[derive(Debug, Default)]
struct PageCursor {
    current: Option<String>,
    seen: HashSet<String>,
    pages: usize,
}

impl PageCursor {
    fn token(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Record one fetched page. Returns whether another page should be fetched.
    fn advance(&mut self, path: &str, next: Option<String>) -> bool {
        self.pages += 1;
        let Some(token) = next.filter(|t| !t.is_empty()) else {
            return false;
        };
        if !self.seen.insert(token.clone()) {
            tracing::warn!(path, pages = self.pages, "Page token repeated; stopping pagination");
            return false;
        }
        if self.pages >= MAX_PAGES {
            tracing::warn!(path, pages = self.pages, "Page limit reached; stopping pagination");
            return false;
        }
        self.current = Some(token);
        true
    }
}

/// Search filter for the open cases of one organization.
pub fn open_cases_query(org_id: &str) -> String {
    format!("organization=\"organizations/{}\" AND state=OPEN", org_id)
}

/// Addresses in `requested` that are not already in `existing`, compared
/// case-insensitively, first occurrence kept.
pub fn new_subscribers(existing: &[String], requested: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = existing.iter().map(|e| e.trim().to_lowercase()).collect();
    requested
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .filter(|e| seen.insert(e.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Client for the Cloud Support API.
pub struct CloudSupportClient {
    transport: ApiTransport,
    org_id: String,
    /// case number -> full resource name, learned from searches
    case_names: RwLock<HashMap<String, String>>,
    poster: Option<Arc<dyn ChannelPoster>>,
}

impl CloudSupportClient {
    pub fn new(transport: ApiTransport, org_id: impl Into<String>) -> Self {
        Self {
            transport,
            org_id: org_id.into(),
            case_names: RwLock::new(HashMap::new()),
            poster: None,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Result<Self, SourceError> {
        let transport = ApiTransport::new(
            SERVICE,
            config.support_api_url.clone(),
            config.access_token_source(),
            config.api_key.clone(),
            config.request_timeout(),
            config.retry_config(),
        )?;
        Ok(Self::new(transport, config.org_id.clone()))
    }

    /// Where `add_comment(.., notify = true)` announces the comment.
    pub fn with_channel_poster(mut self, poster: Arc<dyn ChannelPoster>) -> Self {
        self.poster = Some(poster);
        self
    }

    /// Full resource name for a case number.
    pub fn case_name(&self, case_number: &str) -> String {
        self.case_names
            .read()
            .ok()
            .and_then(|names| names.get(case_number).cloned())
            .unwrap_or_else(|| format!("organizations/{}/cases/{}", self.org_id, case_number))
    }

    fn remember(&self, record: &CaseRecord) {
        if let Ok(mut names) = self.case_names.write() {
            names.insert(record.case_number.clone(), record.resource_name());
        }
    }

    async fn search_cases(&self, org_id: &str) -> Result<Vec<ApiCase>, SourceError> {
        let path = format!("{}/cases:search", API_VERSION);
        let mut cases = Vec::new();
        let mut cursor = PageCursor::default();
        loop {
            let mut query = vec![
                ("query", open_cases_query(org_id)),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = cursor.token() {
                query.push(("pageToken", token.to_string()));
            }
            let page: SearchCasesResponse = self.transport.get_json(&path, &query).await?;
            cases.extend(page.cases);
            if !cursor.advance(&path, page.next_page_token) {
                break;
            }
        }
        Ok(cases)
    }

    async fn list_comments(&self, case_name: &str) -> Result<Vec<ApiComment>, SourceError> {
        let path = format!("{}/{}/comments", API_VERSION, case_name);
        let mut comments = Vec::new();
        let mut cursor = PageCursor::default();
        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = cursor.token() {
                query.push(("pageToken", token.to_string()));
            }
            let page: ListCommentsResponse = self.transport.get_json(&path, &query).await?;
            comments.extend(page.comments);
            if !cursor.advance(&path, page.next_page_token) {
                break;
            }
        }
        Ok(comments)
    }

    /// Fetch a single case by number.
    pub async fn get_case(&self, case_number: &str) -> Result<ApiCase, SourceError> {
        let path = format!("{}/{}", API_VERSION, self.case_name(case_number));
        self.transport.get_json(&path, &[]).await
    }

    /// Parent resource path of a case, e.g. `projects/123`.
    pub async fn case_parent(&self, case_number: &str) -> Result<String, SourceError> {
        let case = self.get_case(case_number).await?;
        split_case_name(&case.name)
            .map(|(parent, _)| parent)
            .ok_or_else(|| SourceError::Malformed {
                case_number: Some(case_number.to_string()),
                reason: format!("unrecognized case name {:?}", case.name),
            })
    }
}

#[async_trait]
impl CaseSource for CloudSupportClient {
    async fn search_open(&self, org_id: &str) -> Result<Vec<CaseRecord>, SourceError> {
        let cases = self.search_cases(org_id).await?;
        let mut records = Vec::with_capacity(cases.len());
        for case in &cases {
            let comments = self.list_comments(&case.name).await?;
            records.push(normalize_case(case, &comments)?);
        }
        for record in &records {
            self.remember(record);
        }
        tracing::debug!(org_id, cases = records.len(), "Fetched open cases");
        Ok(records)
    }
}

#[async_trait]
impl SupportActions for CloudSupportClient {
    async fn add_comment(&self, request: &CommentRequest) -> WatchResult<()> {
        let path = format!("{}/{}/comments", API_VERSION, self.case_name(&request.case_number));
        let body = CreateCommentRequest {
            body: request.signed_body(),
        };
        let _: ApiComment = self
            .transport
            .send_json(Method::POST, &path, &[], &body)
            .await?;

        tracing::info!(
            case_number = %request.case_number,
            channel_id = %request.channel_id,
            author = %request.author_label,
            notify = request.notify,
            "Comment added to case"
        );

        if request.notify {
            if let Some(poster) = &self.poster {
                let text = format!(
                    "Comment added to case {} by {}:\n> {}",
                    request.case_number,
                    if request.author_label.is_empty() {
                        request.user_id.as_str()
                    } else {
                        request.author_label.as_str()
                    },
                    request.body
                );
                if let Err(e) = poster.post_to_channel(&request.channel_id, &text).await {
                    tracing::warn!(
                        case_number = %request.case_number,
                        channel_id = %request.channel_id,
                        error = %e,
                        "Failed to announce comment in channel"
                    );
                }
            }
        }
        Ok(())
    }

    async fn subscribe_emails(
        &self,
        channel_id: &str,
        case_number: &str,
        emails: &[String],
        user_id: &str,
    ) -> WatchResult<Vec<String>> {
        let case = self.get_case(case_number).await?;
        let added = new_subscribers(&case.subscriber_email_addresses, emails);
        if added.is_empty() {
            return Ok(added);
        }

        let mut merged = case.subscriber_email_addresses.clone();
        merged.extend(added.iter().cloned());
        let path = format!("{}/{}", API_VERSION, case.name);
        let _: ApiCase = self
            .transport
            .send_json(
                Method::PATCH,
                &path,
                &[("updateMask", "subscriberEmailAddresses".to_string())],
                &SubscriberPatch {
                    subscriber_email_addresses: merged,
                },
            )
            .await?;

        tracing::info!(
            case_number,
            channel_id,
            user_id,
            added = added.len(),
            "Subscribed emails to case"
        );
        Ok(added)
    }
}

impl std::fmt::Debug for CloudSupportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSupportClient")
            .field("transport", &self.transport)
            .field("org_id", &self.org_id)
            .field("channel_poster", &self.poster.is_some())
            .finish()
    }
}
