use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ServiceId;

/// Stable identity of a desired workload unit.
///
/// Two desired sets refer to the same instance when their idents are equal,
/// regardless of the generated runtime ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdent {
    pub service_id: ServiceId,
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub instance: u64,
}

impl InstanceIdent {
    pub fn new(service_id: impl Into<String>, subject_id: impl Into<String>, instance: u64) -> Self {
        Self {
            service_id: service_id.into(),
            subject_id: subject_id.into(),
            instance,
        }
    }
}

impl fmt::Display for InstanceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.service_id, self.subject_id, self.instance)
    }
}
