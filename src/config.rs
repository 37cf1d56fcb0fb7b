//! Run configuration resolved from the process environment.
//!
//! There are no CLI flags: each binary reads its configuration from
//! environment variables once at startup and the resulting [`RunConfig`]
//! is immutable for the lifetime of the run.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HarnessError, Result};
use crate::session::Role;

/// What the spawned workers do with their sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Each worker publishes a fixed number of messages, then disconnects.
    Publish { messages_per_client: u64 },
    /// Each worker listens until the duration elapses or a stop signal fires.
    Listen { duration: Duration },
}

/// Progress reporting mode for workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Pick `Verbose` or `Periodic` from the configured scale.
    Auto,
    /// Log every message.
    Verbose,
    /// Log every Nth message.
    Periodic,
}

impl FromStr for ReportMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ReportMode::Auto),
            "verbose" => Ok(ReportMode::Verbose),
            "periodic" => Ok(ReportMode::Periodic),
            _ => Err(()),
        }
    }
}

/// Resolved per-worker progress verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    PerMessage,
    Periodic(u64),
}

/// Immutable configuration for one harness run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub host: String,
    pub port: u16,
    /// Topic base for publishers, subscription filter for subscribers.
    pub topic: String,
    pub client_count: usize,
    pub workload: Workload,
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    report_mode: ReportMode,
    report_interval: Option<u64>,
}

const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

impl RunConfig {
    /// Resolve publisher configuration from the environment.
    pub fn publisher_from_env() -> Result<Self> {
        Ok(RunConfig {
            host: env::var("MQTT_BROKER_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: parse_var("MQTT_BROKER_PORT", 1883)?,
            topic: env::var("MQTT_TOPIC_BASE").unwrap_or_else(|_| "multi_client/test".to_string()),
            client_count: parse_var("NUM_PUBLISHER_CLIENTS", 1)?,
            workload: Workload::Publish {
                messages_per_client: parse_var("NUM_MESSAGES_PER_CLIENT", 5)?,
            },
            connect_timeout: Duration::from_secs(parse_var("CONNECT_TIMEOUT_SECONDS", 30)?),
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            report_mode: parse_report_mode()?,
            report_interval: parse_opt_var("REPORT_INTERVAL")?,
        })
    }

    /// Resolve subscriber configuration from the environment.
    pub fn subscriber_from_env() -> Result<Self> {
        Ok(RunConfig {
            host: env::var("MQTT_BROKER_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: parse_var("MQTT_BROKER_PORT", 1883)?,
            topic: env::var("MQTT_TOPIC_WILDCARD").unwrap_or_else(|_| "multi_client/#".to_string()),
            client_count: parse_var("NUM_SUBSCRIBER_CLIENTS", 1)?,
            workload: Workload::Listen {
                duration: Duration::from_secs(parse_var("SUBSCRIBER_DURATION_SECONDS", 60)?),
            },
            connect_timeout: Duration::from_secs(parse_var("CONNECT_TIMEOUT_SECONDS", 30)?),
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            report_mode: parse_report_mode()?,
            report_interval: parse_opt_var("REPORT_INTERVAL")?,
        })
    }

    pub fn role(&self) -> Role {
        match self.workload {
            Workload::Publish { .. } => Role::Publisher,
            Workload::Listen { .. } => Role::Subscriber,
        }
    }

    /// Total messages the run is configured to publish. `None` for listeners.
    pub fn expected_total(&self) -> Option<u64> {
        match self.workload {
            Workload::Publish { messages_per_client } => {
                Some(self.client_count as u64 * messages_per_client)
            }
            Workload::Listen { .. } => None,
        }
    }

    /// Resolve the progress verbosity for this run's scale.
    ///
    /// `Auto` keeps the small-run behavior of logging every message and
    /// switches to periodic summaries once the configured scale would flood
    /// the console.
    pub fn verbosity(&self) -> Verbosity {
        let default_interval = match self.workload {
            Workload::Publish { .. } => 100,
            Workload::Listen { .. } => 1000,
        };
        let interval = self.report_interval.unwrap_or(default_interval).max(1);

        match self.report_mode {
            ReportMode::Verbose => Verbosity::PerMessage,
            ReportMode::Periodic => Verbosity::Periodic(interval),
            ReportMode::Auto => {
                let small = match self.workload {
                    Workload::Publish { messages_per_client } => {
                        self.client_count <= 2 || messages_per_client <= 100
                    }
                    Workload::Listen { .. } => self.client_count <= 2,
                };
                if small {
                    Verbosity::PerMessage
                } else {
                    Verbosity::Periodic(interval)
                }
            }
        }
    }
}

fn parse_report_mode() -> Result<ReportMode> {
    match env::var("REPORT_MODE") {
        Ok(raw) => raw.parse().map_err(|_| HarnessError::Config {
            key: "REPORT_MODE",
            value: raw,
        }),
        Err(_) => Ok(ReportMode::Auto),
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| HarnessError::Config { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_opt_var<T: FromStr>(key: &'static str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HarnessError::Config { key, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish_config(clients: usize, messages: u64) -> RunConfig {
        RunConfig {
            host: "localhost".to_string(),
            port: 1883,
            topic: "multi_client/test".to_string(),
            client_count: clients,
            workload: Workload::Publish {
                messages_per_client: messages,
            },
            connect_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(60),
            report_mode: ReportMode::Auto,
            report_interval: None,
        }
    }

    #[test]
    fn test_auto_verbosity_small_run_logs_every_message() {
        assert_eq!(publish_config(2, 5).verbosity(), Verbosity::PerMessage);
        // Few messages per client stays verbose even with many clients.
        assert_eq!(publish_config(50, 100).verbosity(), Verbosity::PerMessage);
    }

    #[test]
    fn test_auto_verbosity_stress_run_is_periodic() {
        assert_eq!(
            publish_config(10, 10_000).verbosity(),
            Verbosity::Periodic(100)
        );
    }

    #[test]
    fn test_explicit_mode_overrides_scale() {
        let mut config = publish_config(10, 10_000);
        config.report_mode = ReportMode::Verbose;
        assert_eq!(config.verbosity(), Verbosity::PerMessage);

        config.report_mode = ReportMode::Periodic;
        config.report_interval = Some(7);
        assert_eq!(config.verbosity(), Verbosity::Periodic(7));
    }

    #[test]
    fn test_expected_total() {
        assert_eq!(publish_config(3, 10).expected_total(), Some(30));
        assert_eq!(publish_config(0, 10).expected_total(), Some(0));

        let listen = RunConfig {
            workload: Workload::Listen {
                duration: Duration::from_secs(60),
            },
            ..publish_config(3, 0)
        };
        assert_eq!(listen.expected_total(), None);
    }

    #[test]
    fn test_report_mode_from_str() {
        assert_eq!("auto".parse(), Ok(ReportMode::Auto));
        assert_eq!("verbose".parse(), Ok(ReportMode::Verbose));
        assert_eq!("periodic".parse(), Ok(ReportMode::Periodic));
        assert!("loud".parse::<ReportMode>().is_err());
    }
}
