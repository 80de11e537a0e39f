//! Watson IoT Platform adapter.
//!
//! Connects as a device with token authentication over TLS 1.2 and
//! publishes every payload as `{"d": ...}` on
//! `iot-2/evt/{events_topic}/fmt/json` at QoS 0.

use async_trait::async_trait;
use rumqttc::QoS;
use serde::{Deserialize, Serialize};

use tc_mqtt_channel::{BrokerAddress, Connector, MqttConfig, MqttConnector, MqttError};
use tc_protocol::{DataSample, TagExtreme, envelope, topics};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CloudProvider, Connection, Delivery, LiveSession};

/// Username Watson IoT expects for token-authenticated devices.
pub const TOKEN_AUTH_USERNAME: &str = "use-token-auth";

/// Device credentials and broker coordinates. Read-only after construction.
#[derive(Debug, Clone, Deserialize)]
pub struct WatsonSettings {
    /// e.g. `ssl://{org}.messaging.internetofthings.ibmcloud.com:8883`.
    pub connection_url: String,
    /// Full client id, `d:{org}:{device_type}:{device_id}`.
    pub device_id: String,
    pub auth_token: String,
    /// Event id used in the publish topic.
    pub events_topic: String,
    /// Trust-anchor bundle for the broker certificate.
    #[serde(default)]
    pub ca_cert_path: String,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_keepalive() -> u16 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

impl WatsonSettings {
    /// Session config: clean session, token auth.
    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            broker_url: self.connection_url.clone(),
            client_id: self.device_id.clone(),
            username: Some(TOKEN_AUTH_USERNAME.to_string()),
            password: Some(self.auth_token.clone()),
            clean_session: true,
            ca_cert_path: self.ca_cert_path.clone(),
            keepalive_secs: self.keepalive_secs,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        let missing = [
            ("auth_token", &self.auth_token),
            ("events_topic", &self.events_topic),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());
        if let Some((field, _)) = missing {
            return Err(ProviderError::Settings(MqttError::Config(format!(
                "{field} must not be empty"
            ))));
        }
        if self.events_topic.contains(['/', '+', '#']) {
            return Err(ProviderError::Settings(MqttError::Config(format!(
                "events_topic '{}' must be a single topic level",
                self.events_topic
            ))));
        }
        let config = self.mqtt_config();
        config.validate().map_err(ProviderError::Settings)?;
        tls_broker(&config).map(|_| ())
    }
}

/// The broker address, refusing anything that would send the token in the clear.
fn tls_broker(config: &MqttConfig) -> ProviderResult<BrokerAddress> {
    let broker = config.broker().map_err(ProviderError::Settings)?;
    if !broker.tls {
        return Err(ProviderError::Settings(MqttError::Config(format!(
            "watson iot requires a TLS broker URL (ssl://), got '{}'",
            config.broker_url
        ))));
    }
    Ok(broker)
}

/// Watson IoT uplink. Generic over the connector so tests can swap in mocks.
pub struct WatsonProvider<C: Connector = MqttConnector> {
    settings: WatsonSettings,
    connector: C,
}

impl WatsonProvider {
    pub fn new(settings: WatsonSettings) -> Self {
        Self::with_connector(settings, MqttConnector)
    }
}

impl<C: Connector> WatsonProvider<C> {
    pub fn with_connector(settings: WatsonSettings, connector: C) -> Self {
        Self {
            settings,
            connector,
        }
    }

    pub fn settings(&self) -> &WatsonSettings {
        &self.settings
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Topic every upload goes to.
    pub fn events_topic(&self) -> String {
        topics::device_event(&self.settings.events_topic)
    }

    async fn publish_envelope<T: Serialize + ?Sized>(
        &self,
        conn: &Connection,
        payload: &T,
    ) -> ProviderResult<Delivery> {
        let Connection::Live(session) = conn else {
            tracing::debug!("connection is not live, skipping publish");
            return Ok(Delivery::Skipped);
        };

        let bytes = envelope::encode(payload)?;
        let topic = self.events_topic();
        tracing::debug!(
            topic = %topic,
            payload = %String::from_utf8_lossy(&bytes),
            "publishing envelope"
        );

        session
            .channel()
            .publish(&topic, &bytes, QoS::AtMostOnce)
            .await
            .map_err(ProviderError::Publish)?;
        Ok(Delivery::Published)
    }
}

#[async_trait]
impl<C: Connector> CloudProvider for WatsonProvider<C> {
    async fn connect(&self) -> ProviderResult<Connection> {
        let config = self.settings.mqtt_config();
        let broker = tls_broker(&config)?;

        let channel = self.connector.open(&config).map_err(|e| match e {
            MqttError::Tls(_) => ProviderError::Tls(e),
            other => ProviderError::Connect(other),
        })?;

        match channel.connected().await {
            Ok(()) => {
                tracing::info!(
                    host = %broker.host,
                    port = broker.port,
                    client_id = %config.client_id,
                    "connected to watson iot"
                );
                Ok(Connection::Live(LiveSession::new(
                    config.client_id,
                    channel,
                )))
            }
            Err(e) => {
                tracing::warn!(error = %e, host = %broker.host, "watson iot connect failed");
                channel.close().await;
                Err(ProviderError::Connect(e))
            }
        }
    }

    async fn upload_samples(
        &self,
        conn: &Connection,
        samples: &[DataSample],
    ) -> ProviderResult<Delivery> {
        self.publish_envelope(conn, samples).await
    }

    async fn upload_extreme(
        &self,
        conn: &Connection,
        extreme: &TagExtreme,
    ) -> ProviderResult<Delivery> {
        self.publish_envelope(conn, extreme).await
    }

    async fn disconnect(&self, conn: &mut Connection) {
        match std::mem::take(conn) {
            Connection::Live(session) => {
                session.channel().close().await;
                tracing::info!(client_id = %session.client_id(), "disconnected from watson iot");
            }
            Connection::Idle => {
                tracing::debug!("disconnect on idle connection ignored");
            }
        }
    }
}
