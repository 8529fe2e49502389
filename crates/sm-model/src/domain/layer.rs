use serde::{Deserialize, Serialize};

use crate::VersionInfo;

/// Shared read-only filesystem layer referenced by service images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub layer_id: String,
    pub digest: String,
    #[serde(default)]
    pub version: VersionInfo,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
}

impl LayerInfo {
    pub fn new(layer_id: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            digest: digest.into(),
            ..Default::default()
        }
    }
}
