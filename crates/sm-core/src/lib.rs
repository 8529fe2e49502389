pub mod api;
pub use api::{OciManager, RunStatusReceiver, Runner, ServiceManager, StatusReceiver, Storage};

mod config;
pub use config::LauncherConfig;

mod error;
pub use error::{CoreError, CoreResult};

pub mod instance;
pub use instance::{Instance, SpecContext};

pub mod launcher;
pub use launcher::{Collaborators, Launcher};

pub mod pool;
pub use pool::{Job, PoolConfig, PoolError, PoolPhase, TaskFn, TaskQueue, WorkerPool};

pub mod service;
pub use service::{LayerCache, Service, ServiceCache};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
