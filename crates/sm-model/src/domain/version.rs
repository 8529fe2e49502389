use serde::{Deserialize, Serialize};

/// Version information attached to services and layers.
///
/// `aos_version` is the monotonically increasing fingerprint used to detect changes;
/// the other fields are informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub aos_version: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vendor_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl VersionInfo {
    pub fn new(aos_version: u64) -> Self {
        Self {
            aos_version,
            ..Default::default()
        }
    }
}
