//! Multi-client MQTT publisher harness.
//!
//! Reads its configuration from the environment (no flags), spawns the
//! configured number of publisher sessions, and prints a throughput report.
//! Exits 0 even when some sessions failed to connect; exits 1 only when the
//! configuration itself cannot be resolved.

use mqtt_swarm::{dispatch, init_logging, RunConfig, StopSignal};

#[tokio::main]
async fn main() {
    init_logging();

    let config = match RunConfig::publisher_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("setup failed: {e}");
            std::process::exit(1);
        }
    };

    match dispatch::run(config, StopSignal::new()).await {
        Ok(report) => report.print(),
        Err(e) => {
            eprintln!("setup failed: {e}");
            std::process::exit(1);
        }
    }
}
