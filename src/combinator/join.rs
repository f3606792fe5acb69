//! Join combinator: await every input future.
//!
//! [`joined`] completes when all inputs succeed, with results in input
//! order regardless of arrival order. The first failure becomes the
//! aggregate's failure; remaining successes are ignored and their
//! registrations are released when the aggregate completes.

use std::sync::Arc;

use super::SliceState;
use crate::context::ExecutionContext;
use crate::executor::Executor;
use crate::fallible::Fallible;
use crate::future::{Future, Promise};
use crate::sync::Lock;

/// Awaits every future in `futures`; succeeds with their values in input
/// order, or fails with the first observed failure.
///
/// An empty input succeeds with `[]`, scheduled on `executor`.
pub fn joined<T>(executor: &Executor, futures: Vec<Future<T>>) -> Future<Vec<T>>
where
    T: Clone + Send + 'static,
{
    if futures.is_empty() {
        return Future::from_thunk(executor, || Ok(Vec::new()));
    }

    let promise = Promise::new();
    let aggregate = promise.future();
    let state = Arc::new(Lock::new(SliceState::new(futures.len())));

    let drain_state = Arc::clone(&state);
    promise.notify_drain(move || {
        drain_state.with(|state| {
            state.abort();
        });
    });

    let weak = promise.downgrade();
    for (index, future) in futures.into_iter().enumerate() {
        let state = Arc::clone(&state);
        let weak = weak.clone();
        let receipt = future.make_final_handler(executor, move |value: Fallible<T>| {
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
        });
        if let Some(receipt) = receipt {
            promise.retain_anchor(Box::new(receipt));
        }
    }

    aggregate
}

/// Contextual [`joined`]: handlers run on the context's executor and the
/// aggregate is a dependent of the context, so context teardown cancels a
/// still-pending aggregate with `ContextDeallocated`.
pub fn joined_with_context<T>(
    context: &ExecutionContext,
    futures: Vec<Future<T>>,
) -> Future<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let aggregate = joined(context.executor(), futures);
    context.add_dependent(&aggregate);
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn joined_preserves_input_order() {
        let a = Promise::new();
        let b = Promise::new();
        let c = Promise::new();
        let all = joined(
            &Executor::immediate(),
            vec![a.future(), b.future(), c.future()],
        );

        // Complete out of order.
        c.succeed(3);
        a.succeed(1);
        b.succeed(2);
        assert_eq!(all.wait().lift_success().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn joined_empty_succeeds_with_empty() {
        let all: Future<Vec<i32>> = joined(&Executor::immediate(), Vec::new());
        assert!(all.wait().lift_success().unwrap().is_empty());
    }

    #[test]
    fn first_failure_wins() {
        let a = Promise::new();
        let b: Promise<i32> = Promise::new();
        let c = Promise::new();
        let all = joined(
            &Executor::immediate(),
            vec![a.future(), b.future(), c.future()],
        );

        a.succeed(1);
        b.fail(Error::cancelled());
        c.succeed(3);
        assert!(all.wait().error().unwrap().is_cancelled());
    }

    #[test]
    fn joined_of_completed_inputs() {
        let all = joined(
            &Executor::immediate(),
            vec![Future::value(1), Future::value(2)],
        );
        assert_eq!(all.wait().lift_success().unwrap(), vec![1, 2]);
    }

    #[test]
    fn context_teardown_cancels_pending_join() {
        let pending: Promise<i32> = Promise::new();
        let all = {
            let context = ExecutionContext::new(Executor::immediate());
            joined_with_context(&context, vec![pending.future()])
        };
        assert!(all.wait().error().unwrap().is_context_deallocated());
    }
}
