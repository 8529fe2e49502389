mod view;
pub use view::{log_status, message_for};

use sm_core::{CoreResult, StatusReceiver};
use sm_model::RunStatus;
use tracing::{debug, info};

/// Status receiver that only writes statuses to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusLog;

impl StatusLog {
    pub fn new() -> Self {
        Self
    }
}

impl StatusReceiver for StatusLog {
    fn instances_run_status(&self, statuses: &[RunStatus]) -> CoreResult<()> {
        let failed = statuses.iter().filter(|s| s.is_failed()).count();
        info!(total = statuses.len(), failed, "run status");
        statuses.iter().for_each(log_status);
        Ok(())
    }

    fn instances_update_status(&self, statuses: &[RunStatus]) -> CoreResult<()> {
        debug!(count = statuses.len(), "status update");
        statuses.iter().for_each(log_status);
        Ok(())
    }
}
