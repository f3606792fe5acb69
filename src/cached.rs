//! Single-flight cached value.
//!
//! [`CachedValue`] wraps a future-producing miss handler and guarantees at
//! most one in-flight computation between invalidations. Every caller of
//! [`CachedValue::value`] receives the same future (identical identity)
//! until [`CachedValue::invalidate`] clears the slot; a failed computation
//! stays cached the same way a successful one does, so retry policy remains
//! with the caller.
//!
//! Invalidation does not cancel an in-flight computation. Callers that
//! still hold the previous future keep observing its eventual completion;
//! the next `value()` starts a fresh one.
//!
//! The slot lock is held across the miss-handler invocation: that is what
//! makes the at-most-one guarantee airtight when `value()` races with
//! itself. The miss handler must therefore return quickly with a future
//! (doing its work asynchronously) and must not call back into the same
//! `CachedValue`.

use crate::context::{ExecutionContext, WeakExecutionContext};
use crate::error::{Error, Result};
use crate::fallible::Fallible;
use crate::future::Future;
use crate::sync::Lock;
use crate::tracing_compat::trace;

type MissHandler<T> = dyn Fn(&ExecutionContext) -> Result<Future<T>> + Send + Sync;

/// A recomputing, invalidatable cache around a future-producing handler.
pub struct CachedValue<T> {
    context: WeakExecutionContext,
    miss_handler: Box<MissHandler<T>>,
    slot: Lock<Option<Future<T>>>,
}

impl<T: Clone + Send + 'static> CachedValue<T> {
    /// Creates a cache owned by `context`.
    ///
    /// The context is captured weakly; once it is gone, `value()` returns
    /// futures failed with `ContextDeallocated`.
    pub fn new<F>(context: &ExecutionContext, miss_handler: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<Future<T>> + Send + Sync + 'static,
    {
        Self {
            context: context.downgrade(),
            miss_handler: Box::new(miss_handler),
            slot: Lock::new(None),
        }
    }

    /// Returns the cached future, invoking the miss handler if the slot
    /// is empty.
    ///
    /// The returned future has stable identity across calls until the
    /// next [`CachedValue::invalidate`]. A raise from the miss handler
    /// becomes a failed (and cached) future.
    pub fn value(&self) -> Future<T> {
        let mut slot = self.slot.lock();
        if let Some(cached) = slot.as_ref() {
            return cached.clone();
        }
        let Some(context) = self.context.upgrade() else {
            return Future::error(Error::context_deallocated());
        };
        trace!("cached value miss");
        let future = match Fallible::from_thunk(|| (self.miss_handler)(&context)) {
            Fallible::Success(future) => future,
            Fallible::Failure(err) => Future::error(err),
        };
        context.add_dependent(&future);
        *slot = Some(future.clone());
        future
    }

    /// Clears the slot. The in-flight computation, if any, is not
    /// cancelled; the next `value()` recomputes.
    pub fn invalidate(&self) {
        self.slot.with(|slot| {
            if slot.take().is_some() {
                trace!("cached value invalidated");
            }
        });
    }
}

impl<T> std::fmt::Debug for CachedValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedValue")
            .field("cached", &self.slot.with(|slot| slot.is_some()))
            .finish()
    }
}
