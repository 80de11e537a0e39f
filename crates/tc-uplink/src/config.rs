//! Uplink configuration, loadable from TOML.

use serde::Deserialize;
use tc_cloud_provider::WatsonSettings;

/// Top-level configuration for the uplink.
#[derive(Debug, Clone, Deserialize)]
pub struct UplinkConfig {
    /// Watson IoT device settings.
    pub watson: WatsonSettings,
}

impl UplinkConfig {
    /// Load and validate config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.watson.validate()?;
        Ok(config)
    }
}
