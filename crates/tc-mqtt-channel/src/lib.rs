//! MQTT session plumbing for TagCloud uplinks.
//!
//! - `MqttConfig` broker URL, credentials and timeouts
//! - `tls` builds the TLS 1.2 transport from a trust-anchor bundle
//! - `Channel` / `Connector` traits (mockable in tests)
//! - `MqttChannel` drives a rumqttc session for production
//! - `MockChannel` / `MockConnector` for testing without a broker

pub mod channel;
pub mod config;
pub mod error;
pub mod mock;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, Connector, MqttChannel, MqttConnector};
pub use config::{BrokerAddress, MqttConfig};
pub use error::{MqttError, MqttResult};
pub use mock::{MockChannel, MockConnector};
pub use rumqttc::{QoS, Transport};
pub use tls::ProviderStatus;
