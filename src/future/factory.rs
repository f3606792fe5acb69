//! Future constructors.
//!
//! Eight factory forms cover the cross product of {immediate value,
//! scheduled thunk, delayed thunk} with {plain, contextual} and {value,
//! future-producing} thunks:
//!
//! - [`Future::value`], [`Future::error`] — complete at construction.
//! - [`Future::from_thunk`], [`Future::flat_from_thunk`] — run a thunk on
//!   an executor.
//! - [`Future::with_context`], [`Future::flat_with_context`] — run a thunk
//!   on a context's executor with the context-liveness check.
//! - [`Future::after`], [`Future::after_with_context`] — delayed thunks,
//!   optionally guarded by a cancellation token.
//!
//! Every thunk is captured fallibly: `Err` returns and panics become the
//! future's failure. Thunks are skipped outright when nobody can observe
//! the result (all consumers dropped) or when a guarding token fired
//! before the timer.

use std::time::Duration;

use super::{Future, Promise, Shared};
use crate::cancel::CancellationToken;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fallible::Fallible;

impl<T: Clone + Send + 'static> Future<T> {
    /// An already-succeeded future. No handler scheduling cost.
    #[must_use]
    pub fn value(value: T) -> Self {
        Self {
            shared: Shared::new_completed(Fallible::Success(value)),
        }
    }

    /// An already-failed future. No handler scheduling cost.
    #[must_use]
    pub fn error(error: Error) -> Self {
        Self {
            shared: Shared::new_completed(Fallible::Failure(error)),
        }
    }

    /// Runs `thunk` on `executor`; success succeeds the future, a raise
    /// fails it.
    pub fn from_thunk<F>(executor: &Executor, thunk: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let promise = Promise::new();
        let weak = promise.downgrade();
        executor.execute(move || {
            if let Some(promise) = weak.upgrade() {
                promise.complete(Fallible::from_thunk(thunk));
            }
        });
        promise.future()
    }

    /// Runs a future-producing `thunk` on `executor` and completes with
    /// the produced future.
    pub fn flat_from_thunk<F>(executor: &Executor, thunk: F) -> Self
    where
        F: FnOnce() -> Result<Future<T>> + Send + 'static,
    {
        let promise = Promise::new();
        let weak = promise.downgrade();
        executor.execute(move || {
            let Some(promise) = weak.upgrade() else {
                return;
            };
            match Fallible::from_thunk(thunk) {
                Fallible::Success(inner) => promise.complete_with(&inner),
                Fallible::Failure(err) => {
                    promise.fail(err);
                }
            }
        });
        promise.future()
    }

    /// Runs `thunk` on the context's executor.
    ///
    /// The context is captured weakly; if it is gone at dispatch time the
    /// future fails with `ContextDeallocated` and the thunk never runs.
    /// The future is registered as a dependent of the context.
    pub fn with_context<F>(context: &ExecutionContext, thunk: F) -> Self
    where
        F: FnOnce(&ExecutionContext) -> Result<T> + Send + 'static,
    {
        let promise = Promise::new();
        let future = promise.future();
        context.add_dependent(&future);
        let weak_context = context.downgrade();
        let weak = promise.downgrade();
        context.executor().execute(move || {
            let Some(promise) = weak.upgrade() else {
                return;
            };
            match weak_context.upgrade() {
                Some(context) => {
                    promise.complete(Fallible::from_thunk(|| thunk(&context)));
                }
                None => promise.cancel_because_of_deallocated_context(),
            }
        });
        future
    }

    /// Contextual variant of [`Future::flat_from_thunk`].
    pub fn flat_with_context<F>(context: &ExecutionContext, thunk: F) -> Self
    where
        F: FnOnce(&ExecutionContext) -> Result<Future<T>> + Send + 'static,
    {
        let promise = Promise::new();
        let future = promise.future();
        context.add_dependent(&future);
        let weak_context = context.downgrade();
        let weak = promise.downgrade();
        context.executor().execute(move || {
            let Some(promise) = weak.upgrade() else {
                return;
            };
            let Some(context) = weak_context.upgrade() else {
                promise.cancel_because_of_deallocated_context();
                return;
            };
            match Fallible::from_thunk(|| thunk(&context)) {
                Fallible::Success(inner) => promise.complete_with(&inner),
                Fallible::Failure(err) => {
                    promise.fail(err);
                }
            }
        });
        future
    }

    /// Runs `thunk` on `executor` after `delay`.
    ///
    /// If `token` fires before the timer, the future fails with
    /// `Cancelled` and the thunk is not run.
    pub fn after<F>(
        executor: &Executor,
        delay: Duration,
        token: Option<&CancellationToken>,
        thunk: F,
    ) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let promise = Promise::new();
        if let Some(token) = token {
            token.add(&promise.cancellable());
        }
        let weak = promise.downgrade();
        executor.execute_after(delay, move || {
            let Some(promise) = weak.upgrade() else {
                return;
            };
            if promise.is_completed() {
                // The guarding token fired first.
                return;
            }
            promise.complete(Fallible::from_thunk(thunk));
        });
        promise.future()
    }

    /// Delayed contextual thunk: [`Future::after`] plus the context
    /// contract of [`Future::with_context`].
    pub fn after_with_context<F>(
        context: &ExecutionContext,
        delay: Duration,
        token: Option<&CancellationToken>,
        thunk: F,
    ) -> Self
    where
        F: FnOnce(&ExecutionContext) -> Result<T> + Send + 'static,
    {
        let promise = Promise::new();
        let future = promise.future();
        context.add_dependent(&future);
        if let Some(token) = token {
            token.add(&promise.cancellable());
        }
        let weak_context = context.downgrade();
        let weak = promise.downgrade();
        context.executor().execute_after(delay, move || {
            let Some(promise) = weak.upgrade() else {
                return;
            };
            if promise.is_completed() {
                return;
            }
            match weak_context.upgrade() {
                Some(context) => {
                    promise.complete(Fallible::from_thunk(|| thunk(&context)));
                }
                None => promise.cancel_because_of_deallocated_context(),
            }
        });
        future
    }
}
