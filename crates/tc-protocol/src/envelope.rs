//! Single-field JSON wrapper expected by the Watson IoT broker.
//!
//! Every device event is published as `{"d": <payload>}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub d: T,
}

/// Wrap `payload` in an envelope and encode it as UTF-8 JSON.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Envelope { d: payload })
}

/// Decode an envelope and return its payload.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
    Ok(envelope.d)
}
