//! Watcher configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables, then validated. Required identifiers have no defaults; a
//! missing one aborts startup.

use crate::error::ConfigError;
use crate::hierarchy::TrackedAsset;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_DEFER_SECS: u64 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_STORE_SIZE_MB: usize = 256;
/// Upper bound on the LMDB map size (1 TiB).
pub const MAX_STORE_SIZE_MB: usize = 1024 * 1024;
pub const DEFAULT_STORE_PATH: &str = "casewatch-store";
pub const DEFAULT_SUPPORT_API_URL: &str = "https://cloudsupport.googleapis.com";
pub const DEFAULT_RESOURCE_MANAGER_URL: &str = "https://cloudresourcemanager.googleapis.com";
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Where the bearer token for the cloud APIs comes from.
///
/// A token file is re-read for every request, so an external refresher can
/// rotate short-lived tokens without restarting the watcher.
#[derive(Clone, PartialEq, Eq)]
pub enum AccessToken {
    Static(String),
    File(PathBuf),
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        AccessToken::Static(token)
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        AccessToken::Static(token.to_string())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessToken::Static(_) => f.write_str("Static([REDACTED])"),
            AccessToken::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Retry configuration for outbound API calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry.min(16) as i32);
        self.initial_backoff.mul_f32(factor).min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlackConfig {
    pub bot_token: String,
    pub api_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: DEFAULT_SLACK_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
}

/// Seeds the per-case subscriber list at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseChannelBinding {
    pub channel_id: String,
    pub case_number: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub org_id: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub access_token: String,
    /// Takes precedence over `access_token` when set.
    pub access_token_file: Option<PathBuf>,
    pub store_path: PathBuf,
    pub store_size_mb: usize,
    pub poll_interval_secs: u64,
    pub defer_secs: u64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub support_api_url: String,
    pub resource_manager_url: String,
    pub slack: Option<SlackConfig>,
    pub webhook: Option<WebhookConfig>,
    pub tracked_assets: Vec<TrackedAsset>,
    pub case_channels: Vec<CaseChannelBinding>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            org_id: String::new(),
            project_id: String::new(),
            api_key: None,
            access_token: String::new(),
            access_token_file: None,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            store_size_mb: DEFAULT_STORE_SIZE_MB,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            defer_secs: DEFAULT_DEFER_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            support_api_url: DEFAULT_SUPPORT_API_URL.to_string(),
            resource_manager_url: DEFAULT_RESOURCE_MANAGER_URL.to_string(),
            slack: None,
            webhook: None,
            tracked_assets: Vec::new(),
            case_channels: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// File (if any), then environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides. `lookup` abstracts the environment so
    /// callers can supply a fixed map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ORG_ID") {
            self.org_id = v;
        }
        if let Some(v) = lookup("PROJECT_ID") {
            self.project_id = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("CASEWATCH_ACCESS_TOKEN") {
            self.access_token = v;
        }
        if let Some(v) = lookup("CASEWATCH_ACCESS_TOKEN_FILE") {
            self.access_token_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("CASEWATCH_STORE_PATH") {
            self.store_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CASEWATCH_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_env("CASEWATCH_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("CASEWATCH_DEFER_SECS") {
            self.defer_secs = parse_env("CASEWATCH_DEFER_SECS", &v)?;
        }
        if let Some(v) = lookup("CASEWATCH_MAX_RETRIES") {
            self.max_retries = parse_env("CASEWATCH_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CASEWATCH_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("CASEWATCH_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("CASEWATCH_SUPPORT_API_URL") {
            self.support_api_url = v;
        }
        if let Some(v) = lookup("CASEWATCH_RESOURCE_MANAGER_URL") {
            self.resource_manager_url = v;
        }
        if let Some(v) = lookup("SLACK_BOT_TOKEN") {
            self.slack.get_or_insert_with(SlackConfig::default).bot_token = v;
        }
        if let Some(v) = lookup("CASEWATCH_WEBHOOK_URL") {
            self.webhook.get_or_insert_with(WebhookConfig::default).url = v;
        }
        if let Some(v) = lookup("CASEWATCH_WEBHOOK_SECRET") {
            self.webhook.get_or_insert_with(WebhookConfig::default).secret = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("org_id", &self.org_id)?;
        require_non_empty("project_id", &self.project_id)?;
        match &self.access_token_file {
            Some(path) if path.as_os_str().is_empty() => {
                return Err(ConfigError::MissingRequired {
                    field: "access_token_file".to_string(),
                });
            }
            Some(_) => {}
            None => require_non_empty("access_token", &self.access_token)?,
        }

        if self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "store_path".to_string(),
            });
        }
        require_positive("store_size_mb", self.store_size_mb as u64)?;
        if self.store_size_mb > MAX_STORE_SIZE_MB {
            return Err(ConfigError::InvalidValue {
                field: "store_size_mb".to_string(),
                value: self.store_size_mb.to_string(),
                reason: format!("must be <= {}", MAX_STORE_SIZE_MB),
            });
        }
        require_positive("poll_interval_secs", self.poll_interval_secs)?;
        require_positive("defer_secs", self.defer_secs)?;
        require_positive("request_timeout_secs", self.request_timeout_secs)?;
        require_url("support_api_url", &self.support_api_url)?;
        require_url("resource_manager_url", &self.resource_manager_url)?;

        if let Some(slack) = &self.slack {
            require_non_empty("slack.bot_token", &slack.bot_token)?;
            require_url("slack.api_url", &slack.api_url)?;
        }
        if let Some(webhook) = &self.webhook {
            require_url("webhook.url", &webhook.url)?;
            if webhook.secret.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(ConfigError::MissingRequired {
                    field: "webhook.secret".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn defer_interval(&self) -> Duration {
        Duration::from_secs(self.defer_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn access_token_source(&self) -> AccessToken {
        match &self.access_token_file {
            Some(path) => AccessToken::File(path.clone()),
            None => AccessToken::Static(self.access_token.clone()),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            ..RetryConfig::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be > 0".to_string(),
        });
    }
    Ok(())
}

fn require_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be an http(s) URL".to_string(),
        });
    }
    Ok(())
}
