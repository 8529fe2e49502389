use sm_model::{InstanceState, RunStatus};
use tracing::{debug, error, info, trace, warn};

#[inline]
pub fn message_for(state: InstanceState) -> &'static str {
    match state {
        // preparation
        InstanceState::Created => "instance created (not started yet)",
        InstanceState::SpecBuilt => "runtime spec written",

        // lifecycle
        InstanceState::Starting => "instance is starting",
        InstanceState::Active => "instance is running",
        InstanceState::Stopping => "instance is stopping",
        InstanceState::Stopped => "instance stopped",

        // terminal
        InstanceState::Failed => "instance failed",
    }
}

/// Logs one status at a level matching its state.
#[inline]
pub fn log_status(s: &RunStatus) {
    let msg = message_for(s.state);
    let reason = s.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown");

    match s.state {
        InstanceState::Created | InstanceState::SpecBuilt => trace!(ident = %s.ident, "{msg}"),
        InstanceState::Starting | InstanceState::Stopping => debug!(ident = %s.ident, "{msg}"),
        InstanceState::Active => info!(ident = %s.ident, version = s.aos_version, "{msg}"),
        InstanceState::Stopped => match &s.error {
            Some(_) => warn!(ident = %s.ident, reason, "{msg}"),
            None => info!(ident = %s.ident, "{msg}"),
        },
        InstanceState::Failed => error!(
            ident = %s.ident,
            version = s.aos_version,
            kind = ?s.error.as_ref().map(|e| e.kind),
            reason,
            "{msg}"
        ),
    }
}
