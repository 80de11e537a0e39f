//! Cloud provider error types.

use tc_mqtt_channel::MqttError;
use thiserror::Error;

/// Errors surfaced by a `CloudProvider`. None of them is retried.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider settings: {0}")]
    Settings(#[source] MqttError),

    /// TLS could not be set up; no connection was attempted.
    #[error("TLS setup failed: {0}")]
    Tls(#[source] MqttError),

    #[error("connect failed: {0}")]
    Connect(#[source] MqttError),

    #[error("publish failed: {0}")]
    Publish(#[source] MqttError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for provider results.
pub type ProviderResult<T> = Result<T, ProviderError>;
