use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ServiceId, VersionInfo};

/// Desired service as delivered by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service_id: ServiceId,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub version: VersionInfo,
    #[serde(default)]
    pub gid: u32,
    /// Location of the service image (`file://` or a plain path for local installs).
    #[serde(default)]
    pub url: String,
    /// Hex encoded SHA-256 of the image archive.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
}

impl ServiceInfo {
    pub fn new(service_id: impl Into<String>, aos_version: u64) -> Self {
        Self {
            service_id: service_id.into(),
            version: VersionInfo::new(aos_version),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// Service record kept by the service manager once the image is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceData {
    pub service_id: ServiceId,
    #[serde(default)]
    pub provider_id: String,
    pub version: VersionInfo,
    /// Root directory of the unpacked image.
    pub image_path: PathBuf,
}

impl From<&ServiceData> for ServiceInfo {
    fn from(data: &ServiceData) -> Self {
        Self {
            service_id: data.service_id.clone(),
            provider_id: data.provider_id.clone(),
            version: data.version.clone(),
            url: data.image_path.display().to_string(),
            ..Default::default()
        }
    }
}

/// Paths of the individual parts inside an unpacked service image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageParts {
    pub image_config_path: PathBuf,
    pub service_config_path: PathBuf,
    pub service_fs_path: PathBuf,
}
