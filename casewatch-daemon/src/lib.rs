//! Casewatch Daemon - Process Bootstrap
//!
//! Loads configuration, installs tracing, wires the store and HTTP adapters
//! into a cycle runner, and drives it on a fixed interval until shutdown.

pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod scheduler;
pub mod telemetry;

pub use bootstrap::{build_runner, build_sinks, seed_registry};
pub use cli::CliArgs;
pub use error::{DaemonError, DaemonResult};
pub use scheduler::{run_once, watch_task, WatchMetrics, WatchMetricsSnapshot, WatchSchedule};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
