//! Multi-client MQTT load-generation harness.
//!
//! Spawns N concurrent publisher or subscriber sessions against a broker,
//! waits for them to connect, fans out one worker per connected session,
//! aggregates shared counters, and reports aggregate throughput. All MQTT
//! semantics (connect, subscribe, QoS handling, retries) are delegated to
//! the `rumqttc` client library; this crate only coordinates the sessions.

pub mod barrier;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod session;
pub mod stop;

pub use config::{RunConfig, Workload};
pub use error::{HarnessError, Result};
pub use report::RunReport;
pub use stop::StopSignal;

use tracing_subscriber::EnvFilter;

/// Initialize logging for the CLI binaries. Respects `RUST_LOG`, defaulting
/// to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
