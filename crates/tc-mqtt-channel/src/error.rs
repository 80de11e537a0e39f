//! MQTT channel error types.

use thiserror::Error;

/// Errors that can occur during MQTT operations.
#[derive(Debug, Clone, Error)]
pub enum MqttError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("timed out after {0}s waiting for broker acknowledgement")]
    Timeout(u64),

    /// The session ended without a reported cause.
    #[error("session closed")]
    Closed,

    #[error("publish error: {0}")]
    Publish(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Convenience alias for MQTT results.
pub type MqttResult<T> = Result<T, MqttError>;
