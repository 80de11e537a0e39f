//! Cloud provider contract for TagCloud uplinks and its Watson IoT adapter.
//!
//! - `CloudProvider` trait: connect / upload / disconnect
//! - `Connection` sealed handle (`Live` session or `Idle`)
//! - `WatsonProvider` publishing `{"d": ...}` envelopes over MQTT + TLS 1.2

pub mod error;
pub mod provider;
pub mod watson;

pub use error::{ProviderError, ProviderResult};
pub use provider::{CloudProvider, Connection, Delivery, LiveSession};
pub use watson::{TOKEN_AUTH_USERNAME, WatsonProvider, WatsonSettings};
