use std::path::Path;

use sm_model::RunnerStatus;

use crate::error::CoreResult;

/// Starts and stops workloads described by a runtime directory.
pub trait Runner: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "runner"
    }

    /// Starts `instance_id` from the descriptor stored in `runtime_dir`.
    ///
    /// Failures are reported through the returned status, not as an error.
    fn start_instance(&self, instance_id: &str, runtime_dir: &Path) -> RunnerStatus;

    fn stop_instance(&self, instance_id: &str) -> CoreResult<()>;
}
