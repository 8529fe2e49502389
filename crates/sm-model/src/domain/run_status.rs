use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{InstanceId, InstanceIdent, InstanceState};

/// Category of an error attached to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    CapacityExceeded,
    NotFound,
    InvalidArgument,
    WrongState,
    Runner,
    Io,
    Storage,
    Oci,
    ServiceManager,
}

/// Serializable error carried inside statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StatusError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Aggregated status of one instance, delivered to the status receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub ident: InstanceIdent,
    /// Version of the service the instance runs, `0` if unresolved.
    pub aos_version: u64,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
}

impl RunStatus {
    pub fn is_failed(&self) -> bool {
        self.state == InstanceState::Failed
    }
}

/// State reported by the runner for a single instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStatus {
    pub instance_id: InstanceId,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
}

impl RunnerStatus {
    pub fn active(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            state: InstanceState::Active,
            error: None,
        }
    }

    pub fn failed(instance_id: impl Into<String>, error: StatusError) -> Self {
        Self {
            instance_id: instance_id.into(),
            state: InstanceState::Failed,
            error: Some(error),
        }
    }
}
