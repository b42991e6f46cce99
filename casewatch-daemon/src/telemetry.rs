//! Tracing subscriber setup.
//!
//! `RUST_LOG` selects the filter (default `casewatch=info,info`);
//! `CASEWATCH_LOG_FORMAT` picks `json` (default) or `pretty` output.

use crate::error::{DaemonError, DaemonResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "casewatch=info,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "plain" | "text" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    pub service_version: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Unknown `CASEWATCH_LOG_FORMAT` values fall back to JSON.
    pub fn from_env() -> Self {
        let format = std::env::var("CASEWATCH_LOG_FORMAT")
            .ok()
            .and_then(|raw| LogFormat::parse(&raw))
            .unwrap_or(LogFormat::Json);
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_tracing(config: &TelemetryConfig) -> DaemonResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .try_init(),
    };
    result.map_err(|e| DaemonError::Telemetry(e.to_string()))?;

    tracing::info!(
        version = %config.service_version,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}
