//! Cloud Support API (cases, comments, subscribers)

pub mod client;
pub mod normalize;
pub mod types;

pub use client::{new_subscribers, open_cases_query, CloudSupportClient};
pub use normalize::{normalize_case, normalize_comment, parse_case_payload, split_case_name};
pub use types::{ApiActor, ApiCase, ApiComment};
