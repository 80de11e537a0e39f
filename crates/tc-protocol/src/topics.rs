//! MQTT topic builders for the Watson IoT device namespace.
//!
//! ```text
//! iot-2/evt/{event_id}/fmt/json
//! ```

const PREFIX: &str = "iot-2";

/// Topic a device publishes JSON events on.
pub fn device_event(event_id: &str) -> String {
    format!("{PREFIX}/evt/{event_id}/fmt/json")
}
