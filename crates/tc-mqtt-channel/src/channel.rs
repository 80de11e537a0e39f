//! MQTT session: rumqttc client plus the task that drives its event loop.
//!
//! `Connector::open` builds the client and spawns the driver without
//! waiting; `Channel::connected` then waits for the broker's CONNACK.
//! Splitting the two lets the caller release a half-open session when
//! the handshake fails.
//!
//! A publish completes when the driver has written it to the network,
//! not when rumqttc accepted the request.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, Transport,
};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::tls;

/// How long `close` waits for the driver to flush DISCONNECT.
const DRIVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Bound of rumqttc's request queue.
const REQUEST_CAPACITY: usize = 64;

// ── Traits ────────────────────────────────────────────────────

/// One MQTT session with a broker.
///
/// Enables mocking in tests without a real MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Wait until the broker acknowledged the connection.
    async fn connected(&self) -> MqttResult<()>;

    /// Publish a raw payload to a topic. Resolves once the message was
    /// written out, or with the error that ended the session first.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()>;

    /// Release the session. Calling it again is a no-op.
    async fn close(&self);
}

/// Opens sessions. Implementations must not block on the network.
pub trait Connector: Send + Sync {
    fn open(&self, config: &MqttConfig) -> MqttResult<Arc<dyn Channel>>;
}

// ── MqttConnector ─────────────────────────────────────────────

/// Production connector backed by rumqttc. Must be called inside a tokio runtime.
///
/// TLS brokers get the TLS 1.2 transport built from `ca_cert_path`; a
/// failure there is returned as `MqttError::Tls` before anything is spawned.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

impl Connector for MqttConnector {
    fn open(&self, config: &MqttConfig) -> MqttResult<Arc<dyn Channel>> {
        let transport = if config.broker()?.tls {
            tls::load_tls_transport(config)?
        } else {
            tls::plaintext_transport()
        };
        let channel: Arc<dyn Channel> = Arc::new(MqttChannel::open(config, transport)?);
        Ok(channel)
    }
}

// ── Outbox ────────────────────────────────────────────────────

/// Publishes handed to rumqttc but not yet written, oldest first.
#[derive(Default)]
struct Outbox {
    waiting: VecDeque<oneshot::Sender<MqttResult<()>>>,
    /// Why the session can no longer write. Set once, when the driver stops.
    stopped: Option<MqttError>,
}

impl Outbox {
    /// The oldest waiting publish went out.
    fn complete_next(&mut self) {
        if let Some(done) = self.waiting.pop_front() {
            let _ = done.send(Ok(()));
        }
    }

    /// Fail everything still waiting and refuse later publishes.
    fn stop(&mut self, reason: MqttError) {
        for done in self.waiting.drain(..) {
            let _ = done.send(Err(reason.clone()));
        }
        self.stopped.get_or_insert(reason);
    }
}

// ── MqttChannel ───────────────────────────────────────────────

/// Live rumqttc session.
///
/// The event loop runs in a spawned task that stops on the first
/// connection error instead of reconnecting, so a dropped session
/// stays dropped.
pub struct MqttChannel {
    client: AsyncClient,
    connect_timeout: Duration,
    connack: Mutex<Option<oneshot::Receiver<MqttResult<()>>>>,
    outbox: Arc<Mutex<Outbox>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MqttChannel {
    /// Build the client and spawn its event loop driver.
    pub fn open(config: &MqttConfig, transport: Transport) -> MqttResult<Self> {
        config.validate()?;
        let broker = config.broker()?;

        let mut options = MqttOptions::new(&config.client_id, &broker.host, broker.port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
        options.set_clean_session(config.clean_session);
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }
        options.set_transport(transport);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (connack_tx, connack_rx) = oneshot::channel();
        let outbox = Arc::new(Mutex::new(Outbox::default()));
        let driver = tokio::spawn(drive(eventloop, connack_tx, outbox.clone()));

        tracing::debug!(
            host = %broker.host,
            port = broker.port,
            tls = broker.tls,
            client_id = %config.client_id,
            "mqtt session opened"
        );

        Ok(Self {
            client,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            connack: Mutex::new(Some(connack_rx)),
            outbox,
            driver: Mutex::new(Some(driver)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn connected(&self) -> MqttResult<()> {
        let Some(connack) = self.connack.lock().await.take() else {
            return Err(MqttError::Connection(
                "connection outcome already consumed".into(),
            ));
        };

        match tokio::time::timeout(self.connect_timeout, connack).await {
            Ok(Ok(outcome)) => outcome,
            // Driver went away without reporting a cause.
            Ok(Err(_)) => Err(MqttError::Closed),
            Err(_) => Err(MqttError::Timeout(self.connect_timeout.as_secs())),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MqttError::Closed);
        }

        let (done_tx, done_rx) = oneshot::channel();
        {
            // Queue and enqueue under one lock so completions follow request order.
            let mut outbox = self.outbox.lock().await;
            if let Some(reason) = &outbox.stopped {
                return Err(reason.clone());
            }
            outbox.waiting.push_back(done_tx);
            if let Err(e) = self.client.try_publish(topic, qos, false, payload) {
                outbox.waiting.pop_back();
                return Err(MqttError::Publish(e.to_string()));
            }
        }

        match done_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(MqttError::Closed),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "disconnect request not queued, driver already stopped");
        }

        if let Some(driver) = self.driver.lock().await.take() {
            let abort = driver.abort_handle();
            if tokio::time::timeout(DRIVER_SHUTDOWN_GRACE, driver)
                .await
                .is_err()
            {
                tracing::debug!("mqtt driver did not stop in time, aborting");
                abort.abort();
            }
        }

        // An aborted driver never got to release its waiters.
        self.outbox.lock().await.stop(MqttError::Closed);
        tracing::debug!("mqtt session closed");
    }
}

/// Poll the event loop until the session ends, then fail whatever is
/// still waiting in the outbox with the reason it ended.
async fn drive(
    mut eventloop: EventLoop,
    connack: oneshot::Sender<MqttResult<()>>,
    outbox: Arc<Mutex<Outbox>>,
) {
    let reason = run_session(&mut eventloop, connack, &outbox).await;
    outbox.lock().await.stop(reason);
}

/// The first CONNACK (or the first error before it) is reported over
/// `connack`. Errors after that end the session.
async fn run_session(
    eventloop: &mut EventLoop,
    connack: oneshot::Sender<MqttResult<()>>,
    outbox: &Mutex<Outbox>,
) -> MqttError {
    let mut connack = Some(connack);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    if let Some(tx) = connack.take() {
                        let _ = tx.send(Ok(()));
                    }
                } else {
                    let refused = MqttError::Refused(format!("{:?}", ack.code));
                    if let Some(tx) = connack.take() {
                        let _ = tx.send(Err(refused.clone()));
                    }
                    return refused;
                }
            }
            // rumqttc reports an outgoing publish after flushing it.
            Ok(Event::Outgoing(Outgoing::Publish(_))) => {
                outbox.lock().await.complete_next();
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("disconnect sent, stopping mqtt driver");
                return MqttError::Closed;
            }
            Ok(event) => {
                tracing::trace!(?event, "mqtt event");
            }
            Err(e) => {
                return match connack.take() {
                    Some(tx) => {
                        let err = connect_error(e);
                        let _ = tx.send(Err(err.clone()));
                        err
                    }
                    None => {
                        tracing::warn!(error = %e, "mqtt session lost, not reconnecting");
                        MqttError::Publish(format!("session lost: {e}"))
                    }
                };
            }
        }
    }
}

fn connect_error(e: ConnectionError) -> MqttError {
    match e {
        ConnectionError::ConnectionRefused(code) => MqttError::Refused(format!("{code:?}")),
        ConnectionError::RequestsDone => MqttError::Closed,
        other => MqttError::Connection(other.to_string()),
    }
}
