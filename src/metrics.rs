//! Shared run metrics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Concurrency-safe message counters shared by all workers.
///
/// A single lock covers the global total and the per-session counts, so the
/// sum of per-session counts always equals the total and a snapshot observes
/// every increment whose call has returned.
#[derive(Debug, Clone, Default)]
pub struct MetricsCounters {
    inner: Arc<Mutex<Counts>>,
}

#[derive(Debug, Default)]
struct Counts {
    total: u64,
    per_session: HashMap<String, u64>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub per_session: HashMap<String, u64>,
}

impl MetricsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful operation for `session_id`, returning that
    /// session's new count (used for periodic progress logging).
    pub fn record(&self, session_id: &str) -> u64 {
        let mut counts = self.inner.lock().unwrap();
        counts.total += 1;
        let n = counts.per_session.entry(session_id.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    pub fn total(&self) -> u64 {
        self.inner.lock().unwrap().total
    }

    pub fn count_for(&self, session_id: &str) -> u64 {
        let counts = self.inner.lock().unwrap();
        counts.per_session.get(session_id).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counts = self.inner.lock().unwrap();
        MetricsSnapshot {
            total: counts.total,
            per_session: counts.per_session.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_returns_running_per_session_count() {
        let metrics = MetricsCounters::new();
        assert_eq!(metrics.record("pub-1"), 1);
        assert_eq!(metrics.record("pub-1"), 2);
        assert_eq!(metrics.record("pub-2"), 1);
        assert_eq!(metrics.total(), 3);
        assert_eq!(metrics.count_for("pub-1"), 2);
        assert_eq!(metrics.count_for("pub-3"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_lost_updates_under_concurrent_increments() {
        let metrics = MetricsCounters::new();
        let mut handles = Vec::new();

        for worker in 0..8 {
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("pub-{worker}");
                for _ in 0..1000 {
                    metrics.record(&id);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total, 8000);
        assert_eq!(snapshot.per_session.values().sum::<u64>(), snapshot.total);
        assert!(snapshot.per_session.values().all(|n| *n == 1000));
    }

    #[test]
    fn test_snapshot_sum_matches_total() {
        let metrics = MetricsCounters::new();
        metrics.record("a");
        metrics.record("b");
        metrics.record("b");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.per_session.values().sum::<u64>(), snapshot.total);
    }
}
