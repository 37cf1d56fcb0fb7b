//! Final run report.

use std::time::Duration;

use crate::metrics::MetricsSnapshot;
use crate::session::Role;

/// Aggregate outcome of one harness run, printed as the sole artifact.
#[derive(Debug)]
pub struct RunReport {
    pub role: Role,
    pub client_count: usize,
    pub skipped: usize,
    /// Total the run was configured to publish. `None` for listeners.
    pub expected: Option<u64>,
    pub completed: u64,
    pub duration: Duration,
}

impl RunReport {
    pub fn new(
        role: Role,
        client_count: usize,
        skipped: usize,
        expected: Option<u64>,
        snapshot: &MetricsSnapshot,
        duration: Duration,
    ) -> Self {
        RunReport {
            role,
            client_count,
            skipped,
            expected,
            completed: snapshot.total,
            duration,
        }
    }

    /// Average throughput in messages per second; 0 for a zero-length run.
    pub fn rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }

    /// Print the report block to stdout.
    pub fn print(&self) {
        let verb = match self.role {
            Role::Publisher => "published",
            Role::Subscriber => "received",
        };

        println!("\n--- Test Metrics Report ---");
        println!("Total simulated clients: {}", self.client_count);
        if self.skipped > 0 {
            println!("Skipped (never connected): {}", self.skipped);
        }
        match self.expected {
            Some(expected) => println!("Total messages {verb}: {}/{expected}", self.completed),
            None => println!("Total messages {verb}: {}", self.completed),
        }
        println!("Test duration: {:.2} seconds", self.duration.as_secs_f64());
        println!("Average rate: {:.2} messages/second", self.rate());
        println!("----------------------------");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn snapshot(total: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            total,
            per_session: HashMap::new(),
        }
    }

    #[test]
    fn test_rate_is_total_over_duration() {
        let report = RunReport::new(
            Role::Publisher,
            3,
            0,
            Some(30),
            &snapshot(30),
            Duration::from_secs(10),
        );
        assert!((report.rate() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_is_zero_for_zero_duration() {
        let report = RunReport::new(
            Role::Subscriber,
            1,
            0,
            None,
            &snapshot(100),
            Duration::ZERO,
        );
        assert_eq!(report.rate(), 0.0);
    }
}
