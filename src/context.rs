//! Execution contexts: binding work to a collaborator's lifetime.
//!
//! An [`ExecutionContext`] stands for a collaborator (a service, a session,
//! a screen) that owns an executor for default work placement and a release
//! pool for anchoring handler receipts. Dependent computations register
//! with [`ExecutionContext::add_dependent`]; when the last strong handle to
//! the context drops before a dependent completes, the dependent fails with
//! `ContextDeallocated`.
//!
//! Callbacks never hold a context strongly. They capture a
//! [`WeakExecutionContext`] and upgrade at dispatch time; an upgrade that
//! fails means the collaborator is gone and the callback's only correct
//! move is to fail its downstream future. An upgrade that succeeds pins the
//! collaborator for the duration of the callback, never longer.
//!
//! Ownership is deliberately one-directional: the context holds dependents
//! strongly (until they complete), dependents hold the context weakly.
//! There is no cycle to leak.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::executor::Executor;
use crate::future::Future;
use crate::release_pool::ReleasePool;
use crate::sync::Lock;
use crate::tracing_compat::debug;

/// A one-shot state that an execution context can terminate.
///
/// Implemented by the future/promise core; both operations must be
/// idempotent against completed state.
pub(crate) trait Completable: Send + Sync {
    /// Fails the state with `ContextDeallocated` if still pending.
    fn fail_with_deallocated_context(&self);
    /// Returns true once the state has completed.
    fn is_complete(&self) -> bool;
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextInner {
    id: u64,
    executor: Executor,
    pool: ReleasePool,
    next_dependent: AtomicU64,
    dependents: Lock<HashMap<u64, Arc<dyn Completable>>>,
}

/// Collaborator identity owning an executor and a release pool.
///
/// Cloning produces another strong handle to the same context; the context
/// tears down when the last strong handle drops.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

/// Weak handle to an [`ExecutionContext`].
#[derive(Clone)]
pub struct WeakExecutionContext {
    inner: Weak<ContextInner>,
}

impl ExecutionContext {
    /// Creates a context with the given default executor.
    #[must_use]
    pub fn new(executor: Executor) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            context = id,
            executor = executor.label(),
            "execution context created"
        );
        Self {
            inner: Arc::new(ContextInner {
                id,
                executor,
                pool: ReleasePool::new(),
                next_dependent: AtomicU64::new(0),
                dependents: Lock::new(HashMap::new()),
            }),
        }
    }

    /// The context's default executor.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// The pool anchoring this context's handler receipts.
    #[must_use]
    pub fn release_pool(&self) -> &ReleasePool {
        &self.inner.pool
    }

    /// Returns a weak handle for capture in callbacks.
    #[must_use]
    pub fn downgrade(&self) -> WeakExecutionContext {
        WeakExecutionContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers `future` so that context teardown, if it precedes
    /// completion, fails it with `ContextDeallocated`.
    ///
    /// The context keeps the dependent alive until it completes or the
    /// context is gone, whichever comes first.
    pub fn add_dependent<T: Clone + Send + 'static>(&self, future: &Future<T>) {
        let completable = future.completable();
        if completable.is_complete() {
            return;
        }
        let id = self.inner.next_dependent.fetch_add(1, Ordering::Relaxed);
        self.inner.dependents.with(|dependents| {
            dependents.insert(id, completable);
        });

        // Completion releases the entry so a long-lived context does not
        // accumulate finished dependents.
        let weak = self.downgrade();
        let receipt = future.make_final_handler(&Executor::immediate(), move |_| {
            if let Some(context) = weak.upgrade() {
                context.inner.dependents.with(|dependents| {
                    dependents.remove(&id);
                });
            }
        });
        if let Some(receipt) = receipt {
            future.retain_anchor(Box::new(receipt));
        }
    }

    /// The number of pending dependents, exposed for diagnostics.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.with(|dependents| dependents.len())
    }
}

impl WeakExecutionContext {
    /// Attempts to pin the context. `None` means the collaborator is gone.
    #[must_use]
    pub fn upgrade(&self) -> Option<ExecutionContext> {
        self.inner.upgrade().map(|inner| ExecutionContext { inner })
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let dependents = self.dependents.with(std::mem::take);
        debug!(
            context = self.id,
            pending = dependents.len(),
            "execution context torn down"
        );
        for (_, dependent) in dependents {
            dependent.fail_with_deallocated_context();
        }
        self.pool.drain();
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("executor", &self.inner.executor.label())
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

impl fmt::Debug for WeakExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakExecutionContext")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Promise;

    #[test]
    fn teardown_fails_pending_dependents() {
        let promise: Promise<i32> = Promise::new();
        {
            let context = ExecutionContext::new(Executor::immediate());
            context.add_dependent(&promise.future());
            assert_eq!(context.dependent_count(), 1);
        }
        assert!(promise
            .future()
            .wait()
            .error()
            .expect("expected failure")
            .is_context_deallocated());
    }

    #[test]
    fn completed_dependents_survive_teardown() {
        let promise: Promise<i32> = Promise::new();
        {
            let context = ExecutionContext::new(Executor::immediate());
            context.add_dependent(&promise.future());
            promise.succeed(3);
            assert_eq!(context.dependent_count(), 0);
        }
        assert_eq!(promise.future().wait().lift_success().unwrap(), 3);
    }

    #[test]
    fn already_complete_dependent_is_not_registered() {
        let context = ExecutionContext::new(Executor::immediate());
        let promise: Promise<i32> = Promise::new();
        promise.succeed(1);
        context.add_dependent(&promise.future());
        assert_eq!(context.dependent_count(), 0);
    }

    #[test]
    fn weak_handle_fails_after_teardown() {
        let weak = {
            let context = ExecutionContext::new(Executor::immediate());
            context.downgrade()
        };
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn clone_keeps_context_alive() {
        let promise: Promise<i32> = Promise::new();
        let context = ExecutionContext::new(Executor::immediate());
        let clone = context.clone();
        context.add_dependent(&promise.future());
        drop(context);
        assert!(!promise.future().is_completed());
        drop(clone);
        assert!(promise
            .future()
            .wait()
            .error()
            .unwrap()
            .is_context_deallocated());
    }
}
