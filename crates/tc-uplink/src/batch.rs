use anyhow::Context;
use serde::Deserialize;
use tc_protocol::{DataSample, TagExtreme};

/// Everything read back from one tag, as exported by the reader app.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadBatch {
    #[serde(default)]
    pub samples: Vec<DataSample>,
    #[serde(default)]
    pub extreme: Option<TagExtreme>,
}

impl UploadBatch {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents =
            std::fs::read(path).with_context(|| format!("failed to read batch '{path}'"))?;
        serde_json::from_slice(&contents).with_context(|| format!("failed to parse batch '{path}'"))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.extreme.is_none()
    }
}
