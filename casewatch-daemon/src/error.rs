//! Error types for the daemon.

use casewatch_core::{ConfigError, WatchError};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("Usage: {0} (expected [--config <path>] [--once])")]
    Usage(String),
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
