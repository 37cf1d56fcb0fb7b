//! Work dispatcher: fan out one worker per connected session, then
//! coordinate shutdown and produce the final report.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

use crate::barrier::wait_for_connections;
use crate::config::{RunConfig, Verbosity, Workload};
use crate::connection::{connect_session, Inbound, SessionLink, Subscription};
use crate::error::Result;
use crate::metrics::MetricsCounters;
use crate::registry::ConnectionRegistry;
use crate::report::RunReport;
use crate::session::{build_sessions, ClientSession};
use crate::stop::StopSignal;

/// How often the connection barrier re-reads the registry.
const BARRIER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settle time for in-flight QoS-2 handshakes after the publish loop.
const PUBLISH_GRACE: Duration = Duration::from_secs(2);

/// Bounded wait per worker once the stop signal has been broadcast.
const WORKER_STOP_GRACE: Duration = Duration::from_secs(5);

/// Run one complete harness invocation: build sessions, connect them all,
/// wait at the barrier, dispatch workers, join them, and report.
///
/// Publisher runs always complete their fixed message count and do not
/// observe `stop`; listener runs observe it cooperatively.
pub async fn run(config: RunConfig, stop: StopSignal) -> Result<RunReport> {
    let role = config.role();
    let sessions = build_sessions(role, config.client_count, &config.topic);
    let registry = ConnectionRegistry::new();
    let metrics = MetricsCounters::new();

    let broker = format!("{}:{}", config.host, config.port);
    info!(
        role = %role,
        clients = config.client_count,
        broker = %broker,
        topic = %config.topic,
        "starting multi-client run"
    );

    let started = Instant::now();

    // Fan out asynchronous connects; each session gets its own driver task.
    let mut links: HashMap<String, SessionLink> = HashMap::new();
    for session in &sessions {
        registry.register(&session.id);
        let subscription = match config.workload {
            Workload::Publish { .. } => None,
            Workload::Listen { .. } => Some(Subscription {
                filter: session.topic.clone(),
                qos: QoS::ExactlyOnce,
            }),
        };
        info!(session = %session.id, topic = %session.topic, "creating client");
        links.insert(
            session.id.clone(),
            connect_session(session, &config, &registry, subscription),
        );
    }

    let outcome = wait_for_connections(
        &registry,
        sessions,
        config.connect_timeout,
        BARRIER_POLL_INTERVAL,
    )
    .await;

    // Tear down sessions the barrier excluded; their drivers may still be
    // retrying, so the shutdowns run concurrently and are joined bounded.
    let mut skipped_shutdowns = Vec::new();
    for session in &outcome.skipped {
        warn!(session = %session.id, "skipping session that never connected");
        if let Some(link) = links.remove(&session.id) {
            skipped_shutdowns.push(tokio::spawn(link.shutdown()));
        }
    }

    let verbosity = config.verbosity();
    let mut workers = Vec::new();
    for session in outcome.connected {
        let Some(link) = links.remove(&session.id) else {
            continue;
        };
        let handle = match config.workload {
            Workload::Publish {
                messages_per_client,
            } => tokio::spawn(publish_worker(
                session,
                link,
                registry.clone(),
                metrics.clone(),
                messages_per_client,
                verbosity,
            )),
            Workload::Listen { duration } => tokio::spawn(listen_worker(
                session,
                link,
                registry.clone(),
                metrics.clone(),
                duration,
                verbosity,
                stop.clone(),
            )),
        };
        workers.push(handle);
    }

    let skipped = outcome.skipped.len();
    join_workers(workers, &stop).await;
    for handle in skipped_shutdowns {
        let _ = timeout(WORKER_STOP_GRACE, handle).await;
    }

    Ok(RunReport::new(
        role,
        config.client_count,
        skipped,
        config.expected_total(),
        &metrics.snapshot(),
        started.elapsed(),
    ))
}

/// Join all dispatched workers. While the run is healthy this waits as long
/// as the workers need; once the stop signal fires, each remaining worker
/// gets a bounded grace period and is aborted if it overruns it.
async fn join_workers(workers: Vec<JoinHandle<()>>, stop: &StopSignal) {
    for mut handle in workers {
        let joined = tokio::select! {
            result = &mut handle => {
                if let Err(e) = result {
                    warn!(error = %e, "worker task failed");
                }
                true
            }
            _ = stop.wait() => false,
        };

        if !joined && timeout(WORKER_STOP_GRACE, &mut handle).await.is_err() {
            warn!("worker ignored stop signal, aborting");
            handle.abort();
        }
    }
}

/// Publish `count` uniquely identifiable messages, then disconnect.
async fn publish_worker(
    session: ClientSession,
    link: SessionLink,
    registry: ConnectionRegistry,
    metrics: MetricsCounters,
    count: u64,
    verbosity: Verbosity,
) {
    // The barrier only saw a snapshot; the session may have dropped since.
    if !registry.is_connected(&session.id) {
        warn!(session = %session.id, "no longer connected, skipping publish work");
        link.shutdown().await;
        return;
    }

    info!(session = %session.id, topic = %session.topic, count, "starting to publish");

    for seq in 1..=count {
        let payload = message_payload(&session.id, seq);
        match link.publish(&session.topic, payload.clone().into_bytes()).await {
            Ok(()) => {
                let session_count = metrics.record(&session.id);
                match verbosity {
                    Verbosity::PerMessage => {
                        info!(session = %session.id, topic = %session.topic, message = %payload, "sent");
                    }
                    Verbosity::Periodic(interval) => {
                        if session_count % interval == 0 || seq == count {
                            info!(session = %session.id, published = seq, total = count, "progress");
                        }
                    }
                }
            }
            // Rejected publishes are not fatal; the run continues with a
            // best-effort delivery count.
            Err(e) => {
                warn!(session = %session.id, seq, error = %e, "publish rejected");
            }
        }
    }

    sleep(PUBLISH_GRACE).await;
    link.shutdown().await;
    info!(session = %session.id, "finished publishing and disconnected");
}

/// Count incoming messages until the duration elapses or the stop signal
/// fires, then disconnect.
async fn listen_worker(
    session: ClientSession,
    mut link: SessionLink,
    registry: ConnectionRegistry,
    metrics: MetricsCounters,
    duration: Duration,
    verbosity: Verbosity,
    stop: StopSignal,
) {
    if !registry.is_connected(&session.id) {
        warn!(session = %session.id, "no longer connected, skipping listen work");
        link.shutdown().await;
        return;
    }
    let Some(mut messages) = link.take_messages() else {
        link.shutdown().await;
        return;
    };

    info!(
        session = %session.id,
        filter = %session.topic,
        secs = duration.as_secs(),
        "listening"
    );
    listen_loop(&session.id, &mut messages, &metrics, duration, verbosity, &stop).await;

    link.shutdown().await;
    info!(
        session = %session.id,
        received = metrics.count_for(&session.id),
        "listener disconnected"
    );
}

/// The counting half of a listener, separated from connection teardown.
async fn listen_loop(
    session_id: &str,
    messages: &mut mpsc::Receiver<Inbound>,
    metrics: &MetricsCounters,
    duration: Duration,
    verbosity: Verbosity,
    stop: &StopSignal,
) {
    let started = Instant::now();
    let deadline = sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!(session = %session_id, "listen duration elapsed");
                break;
            }
            _ = stop.wait() => {
                info!(session = %session_id, "stop signal observed");
                break;
            }
            maybe_message = messages.recv() => {
                let Some(message) = maybe_message else {
                    warn!(session = %session_id, "message stream closed");
                    break;
                };
                let session_count = metrics.record(session_id);
                match verbosity {
                    Verbosity::PerMessage => {
                        // Undecodable payloads still count as received.
                        let text = match std::str::from_utf8(&message.payload) {
                            Ok(text) => text.to_string(),
                            Err(_) => format!("<undecodable bytes: {:?}>", message.payload),
                        };
                        info!(
                            session = %session_id,
                            topic = %message.topic,
                            message = %text,
                            "received"
                        );
                    }
                    Verbosity::Periodic(interval) => {
                        if session_count % interval == 0 {
                            let elapsed = started.elapsed().as_secs_f64();
                            let rate = if elapsed > 0.0 {
                                session_count as f64 / elapsed
                            } else {
                                0.0
                            };
                            info!(
                                session = %session_id,
                                received = session_count,
                                rate,
                                "progress"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Build a payload that stays unique across sessions, sequences, and runs.
fn message_payload(session_id: &str, seq: u64) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    let nonce: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("Msg {seq} from '{session_id}' at {timestamp:.6} (RND:{nonce})")
}
