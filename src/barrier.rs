//! Connection barrier: wait for the fan-out of connect requests to settle.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;
use crate::session::ClientSession;

/// Sessions partitioned by the barrier: `connected` are handed to the
/// dispatcher, `skipped` sat in `Connecting`/`Failed` when time ran out.
#[derive(Debug)]
pub struct BarrierOutcome {
    pub connected: Vec<ClientSession>,
    pub skipped: Vec<ClientSession>,
}

/// Poll the registry every `poll_interval` until every session is
/// `Connected` or `timeout` elapses, then partition the sessions.
///
/// This is a best-effort liveness wait, not a guarantee: a session can still
/// drop after the barrier releases, so workers re-check their session's
/// state before doing any work.
pub async fn wait_for_connections(
    registry: &ConnectionRegistry,
    sessions: Vec<ClientSession>,
    timeout: Duration,
    poll_interval: Duration,
) -> BarrierOutcome {
    let started = Instant::now();

    while !registry.all_connected() {
        if started.elapsed() >= timeout {
            warn!(
                connected = registry.connected_count(),
                expected = sessions.len(),
                "connection timeout, proceeding with connected clients"
            );
            break;
        }
        info!(
            connected = registry.connected_count(),
            expected = sessions.len(),
            "waiting for clients to connect"
        );
        sleep(poll_interval).await;
    }

    let (connected, skipped) = sessions
        .into_iter()
        .partition(|session| registry.is_connected(&session.id));

    BarrierOutcome { connected, skipped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{build_sessions, ConnectionState, Role};

    #[tokio::test]
    async fn test_releases_early_once_all_connect() {
        let registry = ConnectionRegistry::new();
        let sessions = build_sessions(Role::Publisher, 2, "t");
        for session in &sessions {
            registry.register(&session.id);
        }

        let flipper = {
            let registry = registry.clone();
            let ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
            tokio::spawn(async move {
                sleep(Duration::from_millis(20)).await;
                for id in &ids {
                    registry.set_state(id, ConnectionState::Connected);
                }
            })
        };

        let outcome = wait_for_connections(
            &registry,
            sessions,
            Duration::from_secs(5),
            Duration::from_millis(5),
        )
        .await;

        flipper.await.unwrap();
        assert_eq!(outcome.connected.len(), 2);
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_releases_with_partial_subset() {
        let registry = ConnectionRegistry::new();
        let sessions = build_sessions(Role::Publisher, 2, "t");
        for session in &sessions {
            registry.register(&session.id);
        }
        registry.set_state(&sessions[0].id, ConnectionState::Connected);

        let timeout = Duration::from_millis(50);
        let poll_interval = Duration::from_millis(10);
        let started = Instant::now();
        let outcome =
            wait_for_connections(&registry, sessions, timeout, poll_interval).await;

        // Must release within timeout + one polling interval (plus slack).
        assert!(started.elapsed() < timeout + poll_interval + Duration::from_millis(50));
        assert_eq!(outcome.connected.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_sessions_release_immediately() {
        let registry = ConnectionRegistry::new();
        let outcome = wait_for_connections(
            &registry,
            Vec::new(),
            Duration::from_secs(30),
            Duration::from_secs(1),
        )
        .await;
        assert!(outcome.connected.is_empty());
        assert!(outcome.skipped.is_empty());
    }
}
