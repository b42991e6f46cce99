//! Slack sink: one `chat.postMessage` per channel following the case.

use crate::message::render;
use async_trait::async_trait;
use casewatch_core::{ChannelPoster, NotificationEvent, NotificationSink, NotifyError, SlackConfig};
use casewatch_storage::CaseChannels;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SINK: &str = "slack";

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    client: Client,
    bot_token: String,
    api_url: String,
    channels: Arc<dyn CaseChannels>,
}

impl SlackNotifier {
    pub fn new(
        config: &SlackConfig,
        channels: Arc<dyn CaseChannels>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::NotConfigured {
                sink: SINK.to_string(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            bot_token: config.bot_token.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            channels,
        })
    }

    async fn post(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        let delivery = |reason: String| NotifyError::Delivery {
            sink: SINK.to_string(),
            reason,
        };
        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&self.bot_token)
            .json(&PostMessage { channel, text })
            .send()
            .await
            .map_err(|e| delivery(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(delivery(format!("HTTP {}", status.as_u16())));
        }
        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| delivery(format!("Failed to parse response: {}", e)))?;
        if !body.ok {
            return Err(delivery(body.error.unwrap_or_else(|| "unknown error".to_string())));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for SlackNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let channels = match self.channels.channels_for_case(&event.case_number).await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!(
                    case_number = %event.case_number,
                    kind = %event.kind,
                    error = %e,
                    "Slack channel lookup failed"
                );
                return Ok(());
            }
        };
        if channels.is_empty() {
            tracing::debug!(
                case_number = %event.case_number,
                kind = %event.kind,
                "No channels follow case"
            );
            return Ok(());
        }

        let text = render(event);
        let mut failed = 0usize;
        for channel in &channels {
            if let Err(e) = self.post(channel, &text).await {
                failed += 1;
                tracing::warn!(
                    case_number = %event.case_number,
                    kind = %event.kind,
                    channel_id = %channel,
                    error = %e,
                    "Slack delivery failed"
                );
            }
        }

        if failed == channels.len() {
            tracing::error!(
                case_number = %event.case_number,
                kind = %event.kind,
                failed,
                "Slack delivery failed for every channel"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelPoster for SlackNotifier {
    async fn post_to_channel(&self, channel_id: &str, text: &str) -> Result<(), NotifyError> {
        self.post(channel_id, text).await
    }
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("api_url", &self.api_url)
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casewatch_core::EventKind;
    use casewatch_storage::MockStore;

    fn notifier(api_url: &str) -> SlackNotifier {
        SlackNotifier::new(
            &SlackConfig {
                bot_token: "xoxb-secret".to_string(),
                api_url: api_url.to_string(),
            },
            Arc::new(MockStore::new()),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_channels_is_not_an_error() {
        let sink = notifier("http://127.0.0.1:9");
        let event = NotificationEvent {
            case_number: "1".to_string(),
            kind: EventKind::Closed,
            payload: String::new(),
        };
        assert!(sink.notify(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_api_is_logged_not_propagated() {
        let store = Arc::new(MockStore::new());
        store.track_case("C1", "1").await.unwrap();
        let sink = SlackNotifier::new(
            &SlackConfig {
                bot_token: "xoxb".to_string(),
                api_url: "http://127.0.0.1:9".to_string(),
            },
            store,
            Duration::from_millis(200),
        )
        .unwrap();
        let event = NotificationEvent::closed("1");
        assert!(sink.notify(&event).await.is_ok());
        // The channel poster still reports its own failures.
        let err = sink.post_to_channel("C1", "hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery { .. }));
    }

    #[test]
    fn test_response_decoding() {
        let ok: SlackResponse = serde_json::from_str(r#"{"ok": true, "ts": "1.2"}"#).unwrap();
        assert!(ok.ok);
        let err: SlackResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("channel_not_found"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", notifier("https://slack.com/api/"));
        assert!(!rendered.contains("xoxb-secret"));
        assert!(rendered.contains("https://slack.com/api\""));
    }
}
