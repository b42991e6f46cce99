//! Delivers each event to every configured sink.

use async_trait::async_trait;
use casewatch_core::{NotificationEvent, NotificationSink, NotifyError};
use futures_util::future::join_all;
use std::sync::Arc;

#[derive(Default)]
pub struct FanoutNotifier {
    sinks: Vec<(String, Arc<dyn NotificationSink>)>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, name: impl Into<String>, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push((name.into(), sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        if self.sinks.is_empty() {
            tracing::debug!(
                case_number = %event.case_number,
                kind = %event.kind,
                "No notification sinks configured"
            );
            return Ok(());
        }

        let results = join_all(self.sinks.iter().map(|(_, sink)| sink.notify(event))).await;

        let failures: Vec<String> = self
            .sinks
            .iter()
            .zip(results)
            .filter_map(|((name, _), result)| result.err().map(|e| format!("{}: {}", name, e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Delivery {
                sink: "fanout".to_string(),
                reason: failures.join("; "),
            })
        }
    }
}

impl std::fmt::Debug for FanoutNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("FanoutNotifier").field("sinks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counting {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for Counting {
        async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(event.case_number.clone());
            if self.fail {
                return Err(NotifyError::Delivery {
                    sink: "counting".to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_every_sink_receives_event() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let fanout = FanoutNotifier::new()
            .with_sink("a", a.clone())
            .with_sink("b", b.clone());

        let err = fanout
            .notify(&NotificationEvent::closed("5"))
            .await
            .unwrap_err();
        assert_eq!(a.seen.lock().unwrap().as_slice(), ["5".to_string()]);
        assert_eq!(b.seen.lock().unwrap().len(), 1);
        assert!(err.to_string().contains("b: "));
        assert!(!err.to_string().contains("a: "));
    }

    #[tokio::test]
    async fn test_empty_fanout_is_ok() {
        let fanout = FanoutNotifier::new();
        assert!(fanout.is_empty());
        assert!(fanout.notify(&NotificationEvent::closed("1")).await.is_ok());
    }
}
