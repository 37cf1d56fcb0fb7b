//! Multi-client MQTT subscriber harness.
//!
//! Reads its configuration from the environment (no flags), spawns the
//! configured number of listener sessions, and prints a throughput report
//! when the listen duration elapses or Ctrl-C is pressed.

use mqtt_swarm::{dispatch, init_logging, RunConfig, StopSignal};
use tokio::signal;

#[tokio::main]
async fn main() {
    init_logging();

    let config = match RunConfig::subscriber_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("setup failed: {e}");
            std::process::exit(1);
        }
    };

    // Ctrl-C broadcasts the one-shot stop signal; workers observe it
    // cooperatively and disconnect.
    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupt received, signaling workers to stop...");
                stop.trigger();
            }
        });
    }

    match dispatch::run(config, stop).await {
        Ok(report) => report.print(),
        Err(e) => {
            eprintln!("setup failed: {e}");
            std::process::exit(1);
        }
    }
}
