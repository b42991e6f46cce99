//! Casewatch Providers - HTTP Adapters
//!
//! Concrete implementations of the case source, resource hierarchy and
//! support action traits over the Cloud Support and Resource Manager APIs.
//! All calls share bounded exponential retry; only network-level failures,
//! 429 and 5xx are retried.

pub mod resource_manager;
pub mod retry;
pub mod support;
pub mod transport;

pub use resource_manager::{CloudHierarchy, ResourceManagerClient};
pub use retry::{CallError, RetryPolicy};
pub use support::{parse_case_payload, CloudSupportClient};
pub use transport::{classify_status, ApiTransport, StatusClass};
