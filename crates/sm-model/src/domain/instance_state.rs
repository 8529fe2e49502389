use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an instance.
///
/// ```text
/// Created -> SpecBuilt -> Starting -> Active -> Stopping -> Stopped
///               |            |
///               +-> Failed <-+
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceState {
    /// Instance object exists, nothing has been prepared yet.
    #[default]
    Created,
    /// Runtime descriptor has been written to the instance directory.
    SpecBuilt,
    /// Runner has been asked to start the instance.
    Starting,
    /// Runner reports the instance as running.
    Active,
    /// Runner has been asked to stop the instance.
    Stopping,
    /// Instance is stopped and its runtime directory removed.
    Stopped,
    /// Start failed or the runner reported a failure.
    Failed,
}

impl InstanceState {
    /// Returns `true` if no further transition happens without a new start.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::Stopped | InstanceState::Failed)
    }

    /// Returns `true` if the runner may hold resources for this instance.
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Starting | InstanceState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Created => "created",
            InstanceState::SpecBuilt => "specBuilt",
            InstanceState::Starting => "starting",
            InstanceState::Active => "active",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Failed => "failed",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
