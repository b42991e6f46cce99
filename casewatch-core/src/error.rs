//! Error types for casewatch operations

use thiserror::Error;

/// Snapshot store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store backend failure: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Case source and support API errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Network-level failure that outlived the retry budget.
    #[error("Transient failure calling {service} after {attempts} attempts: {reason}")]
    Transient {
        service: String,
        attempts: u32,
        reason: String,
    },

    /// A record that could not be normalized. Aborts the whole fetch.
    #[error("Malformed record{}: {reason}", .case_number.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    Malformed {
        case_number: Option<String>,
        reason: String,
    },

    #[error("Request to {service} rejected with status {status}: {message}")]
    Rejected {
        service: String,
        status: u16,
        message: String,
    },
}

/// Resource hierarchy resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("No project in parent {parent:?} of case {case_number}")]
    NoProject { case_number: String, parent: String },

    #[error("Lookup of {resource} failed: {reason}")]
    Lookup { resource: String, reason: String },

    #[error("Ancestry of {resource} exceeds {max_depth} levels")]
    TooDeep { resource: String, max_depth: usize },
}

/// Notification delivery errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Delivery via {sink} failed: {reason}")]
    Delivery { sink: String, reason: String },

    #[error("Sink {sink} not configured: {reason}")]
    NotConfigured { sink: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all casewatch errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl WatchError {
    /// Failures the scheduler answers by deferring the cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WatchError::Source(SourceError::Transient { .. })
                | WatchError::Storage(StorageError::Backend { .. })
                | WatchError::Storage(StorageError::TransactionFailed { .. })
        )
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, WatchError::Source(SourceError::Malformed { .. }))
    }
}

/// Result type alias for casewatch operations.
pub type WatchResult<T> = Result<T, WatchError>;

// =============================================================================
// TESTS
// =============================================================================
