//! Lock + condition wrappers that always wait on a predicate.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// State guarded by a single mutex. Poisoning is ignored: guarded state is always left consistent
/// before user code runs.
pub(crate) struct Monitor<T> {
    state: Mutex<T>,
}

impl<T> Monitor<T> {
    pub(crate) fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Condition attached to a [`Monitor`].
pub(crate) struct Signal {
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            cond: Condvar::new(),
        }
    }

    /// Blocks until `ready` holds for the guarded state. Spurious wakeups re-check the predicate.
    pub(crate) fn wait_until<'a, T, P>(&self, guard: MutexGuard<'a, T>, mut ready: P) -> MutexGuard<'a, T>
    where
        P: FnMut(&T) -> bool,
    {
        self.cond
            .wait_while(guard, |state| !ready(state))
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Like [`wait_until`](Self::wait_until) but gives up after `timeout`.
    /// The flag is `true` if the predicate holds.
    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn wait_timeout_until<'a, T, P>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: std::time::Duration,
        mut ready: P,
    ) -> (MutexGuard<'a, T>, bool)
    where
        P: FnMut(&T) -> bool,
    {
        let (guard, result) = self
            .cond
            .wait_timeout_while(guard, timeout, |state| !ready(state))
            .unwrap_or_else(PoisonError::into_inner);
        (guard, !result.timed_out())
    }

    pub(crate) fn notify_one(&self) {
        self.cond.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.cond.notify_all();
    }
}
