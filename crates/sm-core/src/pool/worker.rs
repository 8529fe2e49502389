use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use tracing::{debug, error, trace, warn};

use super::{
    Job, PoolError, TaskQueue,
    monitor::{Monitor, Signal},
};

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Thread name prefix.
    pub name: &'static str,
    pub workers: usize,
    /// Task queue budget in bytes.
    pub capacity: usize,
    pub max_task_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "worker",
            workers: 1,
            capacity: 16 * 256,
            max_task_size: 256,
        }
    }
}

/// Lifecycle of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for PoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolPhase::Created => "created",
            PoolPhase::Running => "running",
            PoolPhase::ShuttingDown => "shutting down",
            PoolPhase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

struct PoolState<J> {
    queue: TaskQueue<J>,
    /// Tasks submitted but not yet completed.
    pending: usize,
    phase: PoolPhase,
}

struct Shared<J> {
    state: Monitor<PoolState<J>>,
    /// Work available or shutting down.
    work: Signal,
    /// Progress towards `pending == 0`.
    idle: Signal,
}

/// Fixed number of worker threads draining a bounded [`TaskQueue`].
///
/// Tasks are dequeued in FIFO order; completion order across workers is unspecified.
/// `shutdown` lets in-flight tasks finish and discards tasks that are still queued.
pub struct WorkerPool<J: Job> {
    shared: Arc<Shared<J>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: PoolConfig,
}

impl<J: Job> WorkerPool<J> {
    pub fn new(config: PoolConfig) -> Self {
        let queue = TaskQueue::new(config.capacity, config.max_task_size);
        Self {
            shared: Arc::new(Shared {
                state: Monitor::new(PoolState {
                    queue,
                    pending: 0,
                    phase: PoolPhase::Created,
                }),
                work: Signal::new(),
                idle: Signal::new(),
            }),
            workers: Mutex::new(Vec::with_capacity(config.workers)),
            config,
        }
    }

    /// Spawns the worker threads. Only valid once, from `Created`.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self.shared.state.lock();
            if state.phase != PoolPhase::Created {
                return Err(PoolError::WrongState(state.phase));
            }
            state.phase = PoolPhase::Running;
        }

        for index in 0..self.config.workers {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", self.config.name))
                .spawn(move || worker_loop(&shared, index));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(pool = self.config.name, index, error = %e, "failed to spawn worker");
                    self.stop(&mut workers);
                    return Err(PoolError::Spawn(e.to_string()));
                }
            }
        }

        debug!(pool = self.config.name, workers = self.config.workers, "worker pool started");
        Ok(())
    }

    /// Queues `job` and wakes one idle worker.
    ///
    /// Jobs may be queued before `start`; they run once workers exist.
    pub fn submit(&self, job: J) -> Result<(), PoolError> {
        let mut state = self.shared.state.lock();
        match state.phase {
            PoolPhase::Created | PoolPhase::Running => {}
            phase => return Err(PoolError::WrongState(phase)),
        }

        state.queue.push(job)?;
        state.pending += 1;
        drop(state);

        self.shared.work.notify_one();
        Ok(())
    }

    /// Blocks until every submitted job has completed.
    ///
    /// On a pool that was never started this blocks until `shutdown` discards the queue.
    pub fn wait_idle(&self) {
        let state = self.shared.state.lock();
        let _state = self.shared.idle.wait_until(state, |s| s.pending == 0);
    }

    /// Stops the workers and returns the number of queued jobs that were discarded.
    ///
    /// Jobs already picked up by a worker run to completion before this returns.
    pub fn shutdown(&self) -> Result<usize, PoolError> {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if self.phase() == PoolPhase::Stopped {
            return Ok(0);
        }

        let discarded = self.stop(&mut workers);
        if discarded > 0 {
            warn!(pool = self.config.name, discarded, "queued tasks discarded on shutdown");
        }
        debug!(pool = self.config.name, "worker pool stopped");
        Ok(discarded)
    }

    pub fn phase(&self) -> PoolPhase {
        self.shared.state.lock().phase
    }

    /// Jobs submitted and not yet completed.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending
    }

    /// Jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn stop(&self, workers: &mut Vec<JoinHandle<()>>) -> usize {
        self.shared.state.lock().phase = PoolPhase::ShuttingDown;
        self.shared.work.notify_all();

        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!(pool = self.config.name, "worker thread terminated abnormally");
            }
        }

        let discarded = {
            let mut state = self.shared.state.lock();
            let n = state.queue.clear();
            state.pending = state.pending.saturating_sub(n);
            state.phase = PoolPhase::Stopped;
            n
        };
        self.shared.idle.notify_all();
        discarded
    }
}

impl<J: Job> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn worker_loop<J: Job>(shared: &Shared<J>, index: usize) {
    trace!(worker = index, "worker started");

    loop {
        let state = shared.state.lock();
        let mut state = shared.work.wait_until(state, |s| {
            s.phase != PoolPhase::Running || !s.queue.is_empty()
        });

        if state.phase != PoolPhase::Running {
            break;
        }

        let Some(size) = state.queue.peek_size() else {
            continue;
        };
        let job = match state.queue.pop(size) {
            Ok(job) => job,
            Err(e) => {
                error!(worker = index, error = %e, "failed to dequeue task");
                continue;
            }
        };
        drop(state);

        if panic::catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
            error!(worker = index, "task panicked");
        }

        let mut state = shared.state.lock();
        state.pending = state.pending.saturating_sub(1);
        drop(state);

        shared.idle.notify_all();
    }

    trace!(worker = index, "worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Job, TaskFn};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc,
    };
    use std::time::Duration;

    type BoxedTask = TaskFn<Box<dyn FnOnce() + Send>>;

    fn boxed(f: impl FnOnce() + Send + 'static) -> BoxedTask {
        TaskFn::new(Box::new(f))
    }

    fn counting(counter: &Arc<AtomicUsize>) -> BoxedTask {
        let counter = Arc::clone(counter);
        boxed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn pool_with(workers: usize, slots: usize) -> WorkerPool<BoxedTask> {
        let slot = boxed(|| {}).footprint();
        WorkerPool::new(PoolConfig {
            name: "test",
            workers,
            capacity: slots * slot,
            max_task_size: 256,
        })
    }

    #[test]
    fn wait_idle_returns_after_every_task_ran_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with(3, 32);
        pool.start().unwrap();

        for _ in 0..32 {
            pool.submit(counting(&counter)).unwrap();
        }
        pool.wait_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 32);
        assert_eq!(pool.pending(), 0);
        pool.shutdown().unwrap();
    }

    #[test]
    fn two_workers_four_slots_drain_to_zero() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with(2, 4);
        pool.start().unwrap();

        for _ in 0..4 {
            pool.submit(counting(&counter)).unwrap();
        }
        pool.wait_idle();

        assert_eq!(pool.pending(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn full_queue_rejects_without_losing_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with(1, 2);

        pool.submit(counting(&counter)).unwrap();
        pool.submit(counting(&counter)).unwrap();
        let err = pool.submit(counting(&counter)).unwrap_err();
        assert!(matches!(err, PoolError::CapacityExceeded { .. }));
        assert_eq!(pool.pending(), 2);
        assert_eq!(pool.queued(), 2);

        pool.start().unwrap();
        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        pool.submit(counting(&counter)).unwrap();
        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn shutdown_finishes_in_flight_and_discards_queued() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(pool_with(1, 8));
        pool.start().unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let completed = Arc::clone(&counter);
        pool.submit(boxed(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            completed.fetch_add(100, Ordering::SeqCst);
        }))
        .unwrap();
        started_rx.recv().unwrap();

        for _ in 0..3 {
            pool.submit(counting(&counter)).unwrap();
        }

        let stopper = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.shutdown().unwrap())
        };
        while pool.phase() != PoolPhase::ShuttingDown {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!stopper.is_finished());

        release_tx.send(()).unwrap();
        let discarded = stopper.join().unwrap();

        assert_eq!(discarded, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(pool.phase(), PoolPhase::Stopped);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn start_twice_is_wrong_state() {
        let pool = pool_with(1, 1);
        pool.start().unwrap();
        assert_eq!(
            pool.start().unwrap_err(),
            PoolError::WrongState(PoolPhase::Running)
        );
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with(1, 1);
        pool.start().unwrap();
        pool.shutdown().unwrap();

        let err = pool.submit(counting(&counter)).unwrap_err();
        assert_eq!(err, PoolError::WrongState(PoolPhase::Stopped));
        assert_eq!(pool.shutdown().unwrap(), 0);
    }

    #[test]
    fn panicking_task_still_counts_as_completed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with(1, 4);
        pool.start().unwrap();

        pool.submit(boxed(|| panic!("boom"))).unwrap();
        pool.submit(counting(&counter)).unwrap();

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.pending(), 0);
    }
}
