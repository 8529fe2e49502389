use std::sync::Arc;

use tracing::{info, warn};

use crate::{instance::Instance, pool::Job};

/// Per-instance work executed on the cooperate-launch pool.
pub(crate) enum LaunchJob {
    Start(Arc<Instance>),
    Stop(Arc<Instance>),
}

impl Job for LaunchJob {
    fn run(self) {
        match self {
            LaunchJob::Start(instance) => match instance.start() {
                Ok(()) => info!(instance = %instance, ident = %instance.ident(), "instance started"),
                Err(e) => warn!(instance = %instance, ident = %instance.ident(), error = %e, "failed to start instance"),
            },
            LaunchJob::Stop(instance) => match instance.stop() {
                Ok(()) => info!(instance = %instance, ident = %instance.ident(), "instance stopped"),
                Err(e) => warn!(instance = %instance, ident = %instance.ident(), error = %e, "failed to stop instance"),
            },
        }
    }
}
