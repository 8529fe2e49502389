use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::InstanceIdent;

/// Desired specification of an instance as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub ident: InstanceIdent,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub priority: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
}

impl InstanceInfo {
    pub fn new(ident: InstanceIdent) -> Self {
        Self {
            ident,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: u64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    /// Service the instance is built from.
    #[inline]
    pub fn service_id(&self) -> &str {
        &self.ident.service_id
    }
}
