//! Bounded retry with exponential backoff for outbound calls.

use casewatch_core::{RetryConfig, SourceError};
use std::future::Future;
use std::time::Duration;

/// Outcome of one failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// Worth another attempt. `retry_after` comes from the server when it
    /// asked for a specific delay.
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Final; returned to the caller as is.
    Fatal(SourceError),
}

impl CallError {
    pub fn transient(reason: impl Into<String>) -> Self {
        CallError::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds, fails fatally, or the retry budget is
    /// spent. An exhausted budget becomes `SourceError::Transient`.
    pub async fn run<T, F, Fut>(&self, service: &str, mut op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let attempts = self.max_attempts();
        let mut last_reason = String::new();

        for attempt in 0..attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(CallError::Fatal(err)) => return Err(err),
                Err(CallError::Transient {
                    reason,
                    retry_after,
                }) => {
                    last_reason = reason;
                    if attempt + 1 < attempts {
                        let delay = retry_after
                            .unwrap_or_else(|| self.config.backoff_for(attempt))
                            .min(self.config.max_backoff);
                        tracing::warn!(
                            service,
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_reason,
                            "Transient failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(SourceError::Transient {
            service: service.to_string(),
            attempts,
            reason: last_reason,
        })
    }
}
