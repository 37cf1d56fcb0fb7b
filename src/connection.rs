//! Per-session wiring to the external MQTT client.
//!
//! Each [`SessionLink`] owns one `rumqttc` client plus the tokio task that
//! drives its network event loop. The driver is the only place that observes
//! connection events: it keeps the shared [`ConnectionRegistry`] up to date
//! and forwards incoming messages to the session's worker over a channel.

use std::time::Duration;

use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::session::{ClientSession, ConnectionState};
use crate::stop::StopSignal;

/// Channel capacity for messages flowing from the driver to a worker.
const MESSAGE_CHANNEL_SIZE: usize = 256;

/// Delay before the driver re-polls after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How long `shutdown` waits for the driver to flush a clean DISCONNECT
/// before forcing it down.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// A subscription the driver (re-)issues on every successful connection,
/// so broker-side reconnects keep the session listening.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub filter: String,
    pub qos: QoS,
}

/// A message delivered to a listener's worker.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub topic: String,
    pub payload: Bytes,
}

/// Handle to one connecting or connected session: the client half for
/// issuing requests plus the driver task that owns the network loop.
pub struct SessionLink {
    client: AsyncClient,
    driver: JoinHandle<()>,
    halt: StopSignal,
    messages: Option<mpsc::Receiver<Inbound>>,
}

/// Issue an asynchronous connect for `session` and spawn its event driver.
///
/// Never blocks on the network: the connection is established by the driver
/// task, which flips the session's registry entry to `Connected` or `Failed`
/// once the broker answers. Sessions with a `subscription` are treated as
/// long-running listeners and ride out connection errors (the client library
/// reconnects on re-poll); sessions without one give up on the first error.
pub fn connect_session(
    session: &ClientSession,
    config: &RunConfig,
    registry: &ConnectionRegistry,
    subscription: Option<Subscription>,
) -> SessionLink {
    let mut options = MqttOptions::new(session.id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);

    let (client, eventloop) = AsyncClient::new(options, 10);
    let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_SIZE);
    let halt = StopSignal::new();

    registry.set_state(&session.id, ConnectionState::Connecting);

    let driver = tokio::spawn(drive(
        session.id.clone(),
        eventloop,
        client.clone(),
        registry.clone(),
        subscription,
        message_tx,
        halt.clone(),
    ));

    SessionLink {
        client,
        driver,
        halt,
        messages: Some(message_rx),
    }
}

impl SessionLink {
    /// Take the incoming-message stream. Yields `Some` once per link.
    pub fn take_messages(&mut self) -> Option<mpsc::Receiver<Inbound>> {
        self.messages.take()
    }

    /// Hand a message to the client library's send path. `Ok` means the
    /// library accepted it locally, not that the broker received it.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::ExactlyOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Disconnect and stop the driver, bounded in time.
    ///
    /// A healthy driver sends a clean DISCONNECT and exits on its own; one
    /// stuck in a reconnect loop is halted, and as a last resort aborted.
    pub async fn shutdown(self) {
        let SessionLink {
            client,
            mut driver,
            halt,
            ..
        } = self;

        let _ = client.disconnect().await;
        if timeout(DISCONNECT_GRACE, &mut driver).await.is_ok() {
            return;
        }

        halt.trigger();
        if timeout(RECONNECT_DELAY, &mut driver).await.is_err() {
            driver.abort();
        }
    }
}

/// Network-event driver for one session.
async fn drive(
    session_id: String,
    mut eventloop: EventLoop,
    client: AsyncClient,
    registry: ConnectionRegistry,
    subscription: Option<Subscription>,
    messages: mpsc::Sender<Inbound>,
    halt: StopSignal,
) {
    let reconnect = subscription.is_some();

    loop {
        let event = tokio::select! {
            event = eventloop.poll() => event,
            _ = halt.wait() => break,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!(session = %session_id, "connected to broker");
                    registry.set_state(&session_id, ConnectionState::Connected);
                    if let Some(sub) = &subscription {
                        if let Err(e) = client.subscribe(sub.filter.clone(), sub.qos).await {
                            warn!(session = %session_id, error = %e, "subscribe request failed");
                        } else {
                            debug!(session = %session_id, filter = %sub.filter, "subscribed");
                        }
                    }
                } else {
                    warn!(session = %session_id, code = ?ack.code, "broker refused connection");
                    registry.set_state(&session_id, ConnectionState::Failed);
                    if !reconnect {
                        break;
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let inbound = Inbound {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                // Receiver gone means the worker finished; late deliveries
                // are not counted.
                if messages.send(inbound).await.is_err() {
                    debug!(session = %session_id, "worker gone, dropping message");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!(session = %session_id, "disconnected cleanly");
                registry.set_state(&session_id, ConnectionState::Disconnected);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if reconnect && !halt.is_triggered() {
                    warn!(session = %session_id, error = %e, "connection lost, retrying");
                    registry.set_state(&session_id, ConnectionState::Connecting);
                    tokio::select! {
                        _ = sleep(RECONNECT_DELAY) => {}
                        _ = halt.wait() => break,
                    }
                } else {
                    let state = if registry.is_connected(&session_id) {
                        ConnectionState::Disconnected
                    } else {
                        ConnectionState::Failed
                    };
                    warn!(session = %session_id, error = %e, "connection error, giving up");
                    registry.set_state(&session_id, state);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{build_sessions, Role};

    fn local_config(port: u16) -> RunConfig {
        let mut config = RunConfig::publisher_from_env().unwrap();
        config.host = "127.0.0.1".to_string();
        config.port = port;
        config
    }

    #[tokio::test]
    async fn test_refused_connection_marks_session_failed() {
        // Nothing listens on port 1, so the connect attempt is refused
        // and the publisher driver gives up.
        let config = local_config(1);
        let session = &build_sessions(Role::Publisher, 1, "t")[0];
        let registry = ConnectionRegistry::new();
        registry.register(&session.id);

        let link = connect_session(session, &config, &registry, None);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while registry.state_of(&session.id) != Some(ConnectionState::Failed) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "driver never reported failure, state: {:?}",
                registry.state_of(&session.id)
            );
            sleep(Duration::from_millis(10)).await;
        }

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_halts_a_reconnecting_listener() {
        let config = local_config(1);
        let session = &build_sessions(Role::Subscriber, 1, "t/#")[0];
        let registry = ConnectionRegistry::new();
        registry.register(&session.id);

        let subscription = Subscription {
            filter: session.topic.clone(),
            qos: QoS::ExactlyOnce,
        };
        let link = connect_session(session, &config, &registry, Some(subscription));

        // The driver is stuck retrying; shutdown must still return promptly.
        sleep(Duration::from_millis(50)).await;
        timeout(Duration::from_secs(5), link.shutdown())
            .await
            .expect("shutdown of a reconnecting link should be bounded");
    }
}
