//! Fan-out transforms over plain collections.
//!
//! [`async_map`] schedules one transform task per input item and fills a
//! pre-sized result buffer at the item's index; [`async_flat_map`] lets the
//! transform produce a future per item and registers a handler on each.
//! Both complete when every index is filled and fail with the first
//! observed failure, eliding transforms that have not started once the
//! aggregate is decided or drained.

use std::sync::Arc;

use super::SliceState;
use crate::context::{ExecutionContext, WeakExecutionContext};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fallible::Fallible;
use crate::future::{Future, Promise, WeakPromise};
use crate::sync::Lock;

/// Applies `transform` to every item on `executor`; succeeds with the
/// results in input order or fails with the first raise.
///
/// An empty input succeeds with `[]`, scheduled on `executor`.
pub fn async_map<I, T, F>(executor: &Executor, items: Vec<I>, transform: F) -> Future<Vec<T>>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(I) -> Result<T> + Send + Sync + 'static,
{
    async_map_inner(executor, items, None, move |_, item| transform(item))
}

/// Contextual [`async_map`]: the transform receives the context, tasks
/// fail the aggregate with `ContextDeallocated` when the context is gone
/// at dispatch, and the aggregate is a dependent of the context.
pub fn async_map_with_context<I, T, F>(
    context: &ExecutionContext,
    items: Vec<I>,
    transform: F,
) -> Future<Vec<T>>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(&ExecutionContext, I) -> Result<T> + Send + Sync + 'static,
{
    let aggregate = async_map_inner(
        context.executor(),
        items,
        Some(context.downgrade()),
        move |context, item| {
            transform(
                context.expect("contextual transform dispatched without context"),
                item,
            )
        },
    );
    context.add_dependent(&aggregate);
    aggregate
}

fn async_map_inner<I, T, F>(
    executor: &Executor,
    items: Vec<I>,
    context: Option<WeakExecutionContext>,
    transform: F,
) -> Future<Vec<T>>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(Option<&ExecutionContext>, I) -> Result<T> + Send + Sync + 'static,
{
    if items.is_empty() {
        return Future::from_thunk(executor, || Ok(Vec::new()));
    }

    let promise = Promise::new();
    let aggregate = promise.future();
    let state = Arc::new(Lock::new(SliceState::new(items.len())));

    let drain_state = Arc::clone(&state);
    promise.notify_drain(move || {
        drain_state.with(|state| {
            state.abort();
        });
    });

    let transform = Arc::new(transform);
    let weak = promise.downgrade();
    for (index, item) in items.into_iter().enumerate() {
        let state = Arc::clone(&state);
        let transform = Arc::clone(&transform);
        let weak = weak.clone();
        let context = context.clone();
        executor.execute(move || {
            if !state.with(|state| state.can_continue()) {
                return;
            }
            let outcome = match pin_context(context.as_ref()) {
                Ok(pinned) => Fallible::from_thunk(|| transform(pinned.as_ref(), item)),
                Err(err) => Fallible::Failure(err),
            };
            settle(&state, &weak, index, outcome);
        });
    }

    aggregate
}

/// Applies a future-producing `transform` to every item on `executor`;
/// the aggregate completes when every produced future has succeeded, or
/// fails with the first raise or future failure.
pub fn async_flat_map<I, T, F>(executor: &Executor, items: Vec<I>, transform: F) -> Future<Vec<T>>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(I) -> Result<Future<T>> + Send + Sync + 'static,
{
    async_flat_map_inner(executor, items, None, move |_, item| transform(item))
}

/// Contextual [`async_flat_map`]; see [`async_map_with_context`] for the
/// context contract.
pub fn async_flat_map_with_context<I, T, F>(
    context: &ExecutionContext,
    items: Vec<I>,
    transform: F,
) -> Future<Vec<T>>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(&ExecutionContext, I) -> Result<Future<T>> + Send + Sync + 'static,
{
    let aggregate = async_flat_map_inner(
        context.executor(),
        items,
        Some(context.downgrade()),
        move |context, item| {
            transform(
                context.expect("contextual transform dispatched without context"),
                item,
            )
        },
    );
    context.add_dependent(&aggregate);
    aggregate
}

fn async_flat_map_inner<I, T, F>(
    executor: &Executor,
    items: Vec<I>,
    context: Option<WeakExecutionContext>,
    transform: F,
) -> Future<Vec<T>>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(Option<&ExecutionContext>, I) -> Result<Future<T>> + Send + Sync + 'static,
{
    if items.is_empty() {
        return Future::from_thunk(executor, || Ok(Vec::new()));
    }

    let promise = Promise::new();
    let aggregate = promise.future();
    let state = Arc::new(Lock::new(SliceState::new(items.len())));

    let drain_state = Arc::clone(&state);
    promise.notify_drain(move || {
        drain_state.with(|state| {
            state.abort();
        });
    });

    let transform = Arc::new(transform);
    let weak = promise.downgrade();
    for (index, item) in items.into_iter().enumerate() {
        let state = Arc::clone(&state);
        let transform = Arc::clone(&transform);
        let weak = weak.clone();
        let context = context.clone();
        let handler_executor = executor.clone();
        executor.execute(move || {
            if !state.with(|state| state.can_continue()) {
                return;
            }
            let produced = match pin_context(context.as_ref()) {
                Ok(pinned) => Fallible::from_thunk(|| transform(pinned.as_ref(), item)),
                Err(err) => Fallible::Failure(err),
            };
            match produced {
                Fallible::Success(inner) => {
                    let handler_state = Arc::clone(&state);
                    let handler_weak = weak.clone();
                    let receipt =
                        inner.make_final_handler(&handler_executor, move |value: Fallible<T>| {
                            settle(&handler_state, &handler_weak, index, value);
                        });
                    if let Some(receipt) = receipt {
                        if let Some(promise) = weak.upgrade() {
                            promise.retain_anchor(Box::new(receipt));
                        }
                    }
                }
                Fallible::Failure(err) => settle(&state, &weak, index, Fallible::Failure(err)),
            }
        });
    }

    aggregate
}

/// Resolves the optional weak context: `Ok(None)` for the plain variants,
/// `Ok(Some(_))` when the context is live, `Err` when it is gone.
fn pin_context(
    context: Option<&WeakExecutionContext>,
) -> std::result::Result<Option<ExecutionContext>, Error> {
    match context {
        None => Ok(None),
        Some(weak) => weak
            .upgrade()
            .map(Some)
            .ok_or_else(Error::context_deallocated),
    }
}

/// Applies one arrival to the shared slice state and completes the
/// aggregate when warranted.
fn settle<T: Clone + Send + 'static>(
    state: &Lock<SliceState<T>>,
    weak: &WeakPromise<Vec<T>>,
    index: usize,
    value: Fallible<T>,
) {
    let Some(promise) = weak.upgrade() else {
        return;
    };
    match value {
        Fallible::Success(value) => {
            if let Some(values) = state.with(|state| state.fill(index, value)) {
                promise.succeed(values);
            }
        }
        Fallible::Failure(err) => {
            if state.with(SliceState::abort) {
                promise.fail(err);
            }
        }
    }
}
