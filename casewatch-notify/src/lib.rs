//! Casewatch Notify - Notification Sinks
//!
//! Delivery is best effort: sinks report failures to the caller, which logs
//! them and moves on. Nothing here ever blocks reconciliation on a retry
//! loop unless explicitly configured inline.

pub mod fanout;
pub mod message;
pub mod slack;
pub mod webhook;

pub use fanout::FanoutNotifier;
pub use message::render;
pub use slack::SlackNotifier;
pub use webhook::{sign_payload, WebhookNotifier, WebhookPayload};
