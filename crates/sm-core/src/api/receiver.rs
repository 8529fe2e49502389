use sm_model::{RunStatus, RunnerStatus};

use crate::error::CoreResult;

/// Consumer of aggregated instance statuses.
pub trait StatusReceiver: Send + Sync {
    /// Full status of every desired instance after a reconciliation.
    fn instances_run_status(&self, statuses: &[RunStatus]) -> CoreResult<()>;

    /// Incremental changes reported between reconciliations.
    fn instances_update_status(&self, statuses: &[RunStatus]) -> CoreResult<()>;
}

/// Callback through which a runner reports asynchronous state changes.
pub trait RunStatusReceiver: Send + Sync {
    fn update_run_status(&self, statuses: &[RunnerStatus]) -> CoreResult<()>;
}
