use std::path::PathBuf;

use serde::Deserialize;

use crate::pool::PoolConfig;

const DEFAULT_WORKERS: usize = 5;
const DEFAULT_MAX_INSTANCES: usize = 16;
const DEFAULT_MAX_SERVICES: usize = 16;
const DEFAULT_MAX_LAYERS: usize = 16;
const DEFAULT_MAX_TASK_SIZE: usize = 256;
const DEFAULT_STATUS_QUEUE: usize = 64;
const DEFAULT_RUNTIME_DIR: &str = "/run/aos/runtime";

/// Launcher limits and paths.
///
/// All tables are bounded by these values; exceeding one is a `CapacityExceeded` error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherConfig {
    /// Number of cooperate-launch worker threads.
    pub workers: usize,
    pub max_instances: usize,
    pub max_services: usize,
    pub max_layers: usize,
    /// Upper bound of a single queued task footprint, in bytes.
    pub max_task_size: usize,
    /// Depth of the deferred status delivery channel.
    pub status_queue: usize,
    /// Parent directory of per-instance runtime directories.
    pub runtime_dir: PathBuf,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_instances: DEFAULT_MAX_INSTANCES,
            max_services: DEFAULT_MAX_SERVICES,
            max_layers: DEFAULT_MAX_LAYERS,
            max_task_size: DEFAULT_MAX_TASK_SIZE,
            status_queue: DEFAULT_STATUS_QUEUE,
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
        }
    }
}

impl LauncherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_instances(mut self, max: usize) -> Self {
        self.max_instances = max;
        self
    }

    pub fn with_max_services(mut self, max: usize) -> Self {
        self.max_services = max;
        self
    }

    pub fn with_max_layers(mut self, max: usize) -> Self {
        self.max_layers = max;
        self
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    pub fn with_status_queue(mut self, depth: usize) -> Self {
        self.status_queue = depth.max(1);
        self
    }

    /// Pool sized so every instance, service or layer can have one task queued.
    pub fn pool_config(&self) -> PoolConfig {
        let slots = self
            .max_instances
            .max(self.max_services)
            .max(self.max_layers)
            .max(1);

        PoolConfig {
            name: "cooperate-launch",
            workers: self.workers.max(1),
            capacity: slots * self.max_task_size,
            max_task_size: self.max_task_size,
        }
    }
}
