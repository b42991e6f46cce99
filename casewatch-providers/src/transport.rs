//! Authenticated JSON over HTTP with retry and error classification.

use crate::retry::{CallError, RetryPolicy};
use casewatch_core::{AccessToken, RetryConfig, SourceError};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// How a non-success HTTP status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Transient,
    Permanent,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        StatusClass::Transient
    } else {
        StatusClass::Permanent
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Pull the message out of a Google-style `{"error": {"message": ..}}` body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(512).collect())
}

/// Shared plumbing for one upstream API.
pub struct ApiTransport {
    client: Client,
    service: &'static str,
    base_url: String,
    access_token: AccessToken,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl ApiTransport {
    pub fn new(
        service: &'static str,
        base_url: impl Into<String>,
        access_token: impl Into<AccessToken>,
        api_key: Option<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Rejected {
                service: service.to_string(),
                status: 0,
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            service,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_key,
            retry: RetryPolicy::new(retry),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        self.execute(|token| self.request(token, Method::GET, path, query))
            .await
    }

    pub async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, SourceError> {
        self.execute(|token| self.request(token, method.clone(), path, query).json(body))
            .await
    }

    /// Current bearer token. A token file is read fresh on every call.
    async fn bearer_token(&self) -> Result<String, SourceError> {
        let path = match &self.access_token {
            AccessToken::Static(token) => return Ok(token.clone()),
            AccessToken::File(path) => path,
        };
        let unavailable = |reason: String| SourceError::Transient {
            service: self.service.to_string(),
            attempts: 1,
            reason,
        };
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            unavailable(format!("Failed to read token file {}: {}", path.display(), e))
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(unavailable(format!("Token file {} is empty", path.display())));
        }
        Ok(token.to_string())
    }

    fn request(
        &self,
        token: &str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token)
            .query(query);
        if let Some(key) = &self.api_key {
            builder = builder.query(&[("key", key)]);
        }
        builder
    }

    async fn execute<T, F>(&self, build: F) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        let service = self.service;
        let token = self.bearer_token().await?;
        self.retry
            .run(service, || {
                let request = build(&token);
                async move {
                    let response = request.send().await.map_err(|e| transport_error(service, e))?;
                    let status = response.status();
                    let retry_after = parse_retry_after(response.headers());

                    match classify_status(status) {
                        StatusClass::Success => {
                            let bytes = response
                                .bytes()
                                .await
                                .map_err(|e| transport_error(service, e))?;
                            serde_json::from_slice(&bytes).map_err(|e| {
                                CallError::Fatal(SourceError::Malformed {
                                    case_number: None,
                                    reason: format!("{} returned undecodable body: {}", service, e),
                                })
                            })
                        }
                        StatusClass::Transient => {
                            let body = response.text().await.unwrap_or_default();
                            Err(CallError::Transient {
                                reason: format!("HTTP {}: {}", status.as_u16(), error_message(&body)),
                                retry_after,
                            })
                        }
                        StatusClass::Permanent => {
                            let body = response.text().await.unwrap_or_default();
                            Err(CallError::Fatal(SourceError::Rejected {
                                service: service.to_string(),
                                status: status.as_u16(),
                                message: error_message(&body),
                            }))
                        }
                    }
                }
            })
            .await
    }
}

fn transport_error(service: &str, e: reqwest::Error) -> CallError {
    if e.is_builder() {
        return CallError::Fatal(SourceError::Rejected {
            service: service.to_string(),
            status: 0,
            message: format!("Invalid request: {}", e),
        });
    }
    CallError::transient(format!("HTTP request failed: {}", e))
}

impl std::fmt::Debug for ApiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiTransport")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
