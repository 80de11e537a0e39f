//! Mock MQTT session for testing without a real broker.
//!
//! Records all published messages, handshakes and closes for
//! assertion in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rumqttc::QoS;

use crate::channel::{Channel, Connector};
use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Mock implementation of the `Channel` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    connect_error: Mutex<Option<MqttError>>,
    publish_error: Mutex<Option<String>>,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            connect_error: Mutex::new(None),
            publish_error: Mutex::new(None),
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// A channel whose handshake fails with `error`.
    pub fn failing(error: MqttError) -> Self {
        let mock = Self::new();
        *mock.connect_error.lock().unwrap() = Some(error);
        mock
    }

    /// Make every subsequent publish fail with `message`.
    pub fn fail_publishes(&self, message: impl Into<String>) {
        *self.publish_error.lock().unwrap() = Some(message.into());
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls, including repeated ones.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls() > 0
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn connected(&self) -> MqttResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        match self.connect_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        if self.is_closed() {
            return Err(MqttError::Closed);
        }
        if let Some(message) = self.publish_error.lock().unwrap().clone() {
            return Err(MqttError::Publish(message));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A recorded `Connector::open` call.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub config: MqttConfig,
    /// Whether the broker URL asked for TLS.
    pub tls: bool,
}

/// Connector that always hands out the same `MockChannel`.
pub struct MockConnector {
    channel: Arc<MockChannel>,
    opened: Mutex<Vec<OpenRequest>>,
    open_error: Mutex<Option<MqttError>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_channel(Arc::new(MockChannel::new()))
    }

    pub fn with_channel(channel: Arc<MockChannel>) -> Self {
        Self {
            channel,
            opened: Mutex::new(Vec::new()),
            open_error: Mutex::new(None),
        }
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: MqttError) {
        *self.open_error.lock().unwrap() = Some(error);
    }

    pub fn channel(&self) -> Arc<MockChannel> {
        self.channel.clone()
    }

    /// All open requests so far.
    pub fn opened(&self) -> Vec<OpenRequest> {
        self.opened.lock().unwrap().clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MockConnector {
    fn open(&self, config: &MqttConfig) -> MqttResult<Arc<dyn Channel>> {
        if let Some(err) = self.open_error.lock().unwrap().take() {
            return Err(err);
        }
        let tls = config.broker()?.tls;
        self.opened.lock().unwrap().push(OpenRequest {
            config: config.clone(),
            tls,
        });
        let channel: Arc<dyn Channel> = self.channel.clone();
        Ok(channel)
    }
}
