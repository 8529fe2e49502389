//! Fixed-capacity task queue and the worker pool that drains it.
//!
//! Tasks are stored in place inside a [`TaskQueue`] whose byte budget is fixed at construction.
//! Each task declares its footprint through [`Job::footprint`]; pushing a task that does not fit
//! into the remaining ring space fails instead of growing the queue.

mod error;
pub use error::PoolError;

mod job;
pub use job::{Job, TASK_ALIGN, TaskFn, footprint_of};

pub(crate) mod monitor;

mod queue;
pub use queue::TaskQueue;

mod worker;
pub use worker::{PoolConfig, PoolPhase, WorkerPool};
