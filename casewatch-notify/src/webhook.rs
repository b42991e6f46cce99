//! Signed webhook sink.
//!
//! Each event is POSTed as JSON with an HMAC-SHA256 signature of the body in
//! `X-Casewatch-Signature: sha256=<hex>`. A failed delivery is retried 3
//! times with exponential backoff of 1s, 2s and 4s (4 attempts in total).

use async_trait::async_trait;
use casewatch_core::{NotificationEvent, NotifyError, Timestamp, WebhookConfig};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SINK: &str = "webhook";
const MAX_RETRIES: u32 = 3;
const MAX_ATTEMPTS: u32 = MAX_RETRIES + 1;

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub delivery_id: Uuid,
    pub event: String,
    pub case_number: String,
    pub payload: String,
    pub timestamp: Timestamp,
}

impl WebhookPayload {
    pub fn for_event(event: &NotificationEvent) -> Self {
        Self {
            delivery_id: Uuid::now_v7(),
            event: event.kind.as_str().to_string(),
            case_number: event.case_number.clone(),
            payload: event.payload.clone(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Generate HMAC-SHA256 signature for a webhook body.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, NotifyError> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| NotifyError::NotConfigured {
            sink: SINK.to_string(),
            reason: format!("Failed to initialize HMAC: {}", e),
        })?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

struct Inner {
    client: reqwest::Client,
    url: String,
    secret: String,
    initial_backoff: Duration,
}

/// Delivers events to one webhook endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    inner: Arc<Inner>,
    detached: bool,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let secret = config
            .secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NotifyError::NotConfigured {
                sink: SINK.to_string(),
                reason: "webhook secret is required".to_string(),
            })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::NotConfigured {
                sink: SINK.to_string(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                url: config.url.clone(),
                secret,
                initial_backoff: Duration::from_secs(1),
            }),
            detached: true,
        })
    }

    /// Deliver inside `notify` instead of on a spawned task, with a custom
    /// first backoff. The retry schedule still doubles.
    pub fn inline(mut self, initial_backoff: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.initial_backoff = initial_backoff;
        }
        self.detached = false;
        self
    }
}

/// Sleep before each retry: `initial`, doubled per retry.
fn retry_delays(initial: Duration) -> Vec<Duration> {
    (0..MAX_RETRIES).map(|n| initial * 2u32.pow(n)).collect()
}

impl Inner {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(payload).map_err(|e| NotifyError::Delivery {
            sink: SINK.to_string(),
            reason: format!("Failed to serialize payload: {}", e),
        })?;
        let signature = sign_payload(&body, &self.secret)?;

        let mut delays = retry_delays(self.initial_backoff).into_iter();
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("X-Casewatch-Signature", format!("sha256={}", signature))
                .header("X-Casewatch-Delivery-ID", payload.delivery_id.to_string())
                .header("X-Casewatch-Event", payload.event.as_str())
                .header("User-Agent", concat!("casewatch/", env!("CARGO_PKG_VERSION")))
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        delivery_id = %payload.delivery_id,
                        case_number = %payload.case_number,
                        status = %response.status(),
                        "Webhook delivered"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status().as_u16());
                    tracing::warn!(
                        delivery_id = %payload.delivery_id,
                        status = %response.status(),
                        attempt,
                        "Webhook delivery failed with non-2xx status"
                    );
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        delivery_id = %payload.delivery_id,
                        error = %e,
                        attempt,
                        "Webhook delivery failed"
                    );
                }
            }

            if let Some(delay) = delays.next() {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            delivery_id = %payload.delivery_id,
            case_number = %payload.case_number,
            "Webhook delivery failed after {} attempts", MAX_ATTEMPTS
        );
        Err(NotifyError::Delivery {
            sink: SINK.to_string(),
            reason: format!("{} attempts failed, last: {}", MAX_ATTEMPTS, last_error),
        })
    }
}

#[async_trait]
impl casewatch_core::NotificationSink for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let payload = WebhookPayload::for_event(event);
        if !self.detached {
            return self.inner.deliver(&payload).await;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // Failures are already logged by deliver().
            let _ = inner.deliver(&payload).await;
        });
        Ok(())
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.inner.url)
            .field("secret", &"[REDACTED]")
            .field("detached", &self.detached)
            .finish()
    }
}
