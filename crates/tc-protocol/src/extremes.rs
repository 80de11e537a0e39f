use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extreme values a tag recorded over one acquisition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagExtreme {
    /// When the tag started logging.
    pub acquisition_start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<DataExtreme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<DataExtreme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<DataExtreme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration: Option<DataExtreme>,
}

/// Minimum and maximum of a single quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataExtreme {
    pub min: ExtremeValue,
    pub max: ExtremeValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremeValue {
    pub value: f32,
    pub date: DateTime<Utc>,
}
