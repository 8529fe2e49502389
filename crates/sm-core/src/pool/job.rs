use std::mem;

/// Alignment every task footprint is rounded up to.
pub const TASK_ALIGN: usize = mem::align_of::<usize>();

/// Bytes a value of `T` occupies inside the task queue.
pub const fn footprint_of<T>() -> usize {
    let size = if mem::size_of::<T>() == 0 {
        1
    } else {
        mem::size_of::<T>()
    };
    (size + TASK_ALIGN - 1) & !(TASK_ALIGN - 1)
}

/// Unit of work executed by a [`WorkerPool`](super::WorkerPool).
///
/// A job runs exactly once, on one worker, without suspension.
pub trait Job: Send + Sized + 'static {
    fn run(self);

    /// Bytes reserved in the task queue while the job is pending.
    fn footprint(&self) -> usize {
        footprint_of::<Self>()
    }
}

/// Closure adapter for ad-hoc jobs.
pub struct TaskFn<F> {
    f: F,
}

impl<F> TaskFn<F>
where
    F: FnOnce() + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Job for TaskFn<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self) {
        (self.f)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_is_aligned() {
        assert_eq!(footprint_of::<()>(), TASK_ALIGN);
        assert_eq!(footprint_of::<u8>(), TASK_ALIGN);
        assert_eq!(footprint_of::<[u8; 9]>() % TASK_ALIGN, 0);
        assert!(footprint_of::<[u8; 9]>() >= 9);
    }

    #[test]
    fn task_fn_runs_closure() {
        let (tx, rx) = std::sync::mpsc::channel();
        TaskFn::new(move || tx.send(42).unwrap()).run();
        assert_eq!(rx.recv().unwrap(), 42);
    }
}
