use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single record read back from a sensor tag.
///
/// Tags log either periodic environmental readings or acceleration
/// events; both are forwarded to the cloud untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSample {
    Sensor(SensorDataSample),
    Event(EventDataSample),
}

impl DataSample {
    /// Acquisition time of the sample.
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            DataSample::Sensor(s) => s.date,
            DataSample::Event(e) => e.date,
        }
    }
}

/// Periodic environmental reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDataSample {
    pub date: DateTime<Utc>,
    /// Degrees celsius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Relative humidity, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f32>,
    /// Millibar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
    /// Peak acceleration in mg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<f32>,
}

/// Acceleration event detected by the tag's inertial unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDataSample {
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<f32>,
    #[serde(default)]
    pub events: Vec<AccelerationEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_orientation: Option<Orientation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelerationEvent {
    Orientation,
    SingleTap,
    DoubleTap,
    FreeFall,
    WakeUp,
    Tilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Undefined,
    Up,
    Down,
    Left,
    Right,
    Top,
    Bottom,
}
