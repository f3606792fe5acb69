//! Short critical-section lock.
//!
//! [`Lock`] is the mutual-exclusion primitive used inside combinators and
//! registries. Critical sections guarded by it are a handful of loads and
//! stores: check a flag, write a result slot, decrement a counter. No user
//! code ever runs while a `Lock` is held, so there is no lock ordering to
//! reason about and no poisoning to recover from.

use parking_lot::{Mutex, MutexGuard};

/// A mutex for short critical sections.
///
/// Thin wrapper over `parking_lot::Mutex` that documents the intended
/// discipline: hold the guard only across field updates, never across a
/// callback or an executor submission.
#[derive(Debug, Default)]
pub struct Lock<T> {
    inner: Mutex<T>,
}

impl<T> Lock<T> {
    /// Creates a new lock around `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquires the lock, blocking briefly if contended.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Runs `f` with the lock held and returns its result.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Consumes the lock, returning the inner value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn with_runs_under_exclusion() {
        let lock = Arc::new(Lock::new(0u64));
        let mut joins = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            joins.push(thread::spawn(move || {
                for _ in 0..1000 {
                    lock.with(|n| *n += 1);
                }
            }));
        }
        for join in joins {
            join.join().expect("worker panicked");
        }
        assert_eq!(*lock.lock(), 8000);
    }

    #[test]
    fn into_inner_returns_value() {
        let lock = Lock::new(vec![1, 2, 3]);
        assert_eq!(lock.into_inner(), vec![1, 2, 3]);
    }
}
