//! Scoped lifetime anchor for handler objects.
//!
//! A [`ReleasePool`] owns a bag of items, typically
//! [`FutureHandler`](crate::future::FutureHandler) receipts and other
//! registration-scoped resources. Draining the pool (explicitly or by
//! dropping it) releases every item at once and runs the registered drain
//! callbacks. Drain happens exactly once; a pool that has drained releases
//! later insertions immediately and runs later drain callbacks inline.
//!
//! The pool is how the library expresses "these callbacks live exactly as
//! long as this collaborator": anchor the receipts in the collaborator's
//! pool and the registrations die with it.

use std::any::Any;

use crate::sync::Lock;
use crate::tracing_compat::trace;

/// A drain callback.
type DrainFn = Box<dyn FnOnce() + Send>;

struct PoolState {
    drained: bool,
    items: Vec<Box<dyn Any + Send>>,
    drain_callbacks: Vec<DrainFn>,
}

/// An anchor owning items that are released together.
pub struct ReleasePool {
    state: Lock<PoolState>,
}

impl Default for ReleasePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleasePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Lock::new(PoolState {
                drained: false,
                items: Vec::new(),
                drain_callbacks: Vec::new(),
            }),
        }
    }

    /// Inserts an item, keeping it alive until the pool drains.
    ///
    /// If the pool has already drained, the item is released immediately.
    pub fn insert(&self, item: impl Any + Send) {
        let rejected = {
            let mut state = self.state.lock();
            if state.drained {
                Some(item)
            } else {
                state.items.push(Box::new(item));
                None
            }
        };
        drop(rejected);
    }

    /// Registers a callback to run when the pool drains.
    ///
    /// If the pool has already drained, the callback runs inline.
    pub fn notify_drain(&self, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.drained {
            drop(state);
            callback();
        } else {
            state.drain_callbacks.push(Box::new(callback));
        }
    }

    /// Releases all items and runs the drain callbacks. Idempotent.
    pub fn drain(&self) {
        let (items, callbacks) = {
            let mut state = self.state.lock();
            if state.drained {
                return;
            }
            state.drained = true;
            (
                std::mem::take(&mut state.items),
                std::mem::take(&mut state.drain_callbacks),
            )
        };
        trace!(
            items = items.len(),
            callbacks = callbacks.len(),
            "release pool drained"
        );
        drop(items);
        for callback in callbacks {
            callback();
        }
    }

    /// Returns true once the pool has drained.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.state.with(|state| state.drained)
    }
}

impl Drop for ReleasePool {
    fn drop(&mut self) {
        self.drain();
    }
}

impl std::fmt::Debug for ReleasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.state.with(|state| {
            f.debug_struct("ReleasePool")
                .field("drained", &state.drained)
                .field("items", &state.items.len())
                .finish()
        })
    }
}
