//! Reduce combinator: fold completions into an accumulator.
//!
//! Two modes:
//!
//! - **Ordered**: await [`joined`](super::joined), then fold the results
//!   sequentially on the requesting executor. Deterministic fold order.
//! - **Unordered**: install one handler per input on a derived serial
//!   executor and fold in arrival order. The serial executor provides the
//!   exclusion a lock otherwise would; the accumulator moves out of the
//!   shared state, through the combine step, and back, with no lock held
//!   while user code runs.
//!
//! Either way, a failing input or a raising combine step fails the
//! aggregate and stops consuming further arrivals.

use std::sync::Arc;

use super::joined;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::executor::Executor;
use crate::fallible::Fallible;
use crate::future::{Future, Promise};
use crate::sync::Lock;

struct FoldState<A> {
    /// Empty only while a combine step is running on the serial executor.
    accumulator: Option<A>,
    remaining: usize,
    can_continue: bool,
}

/// Folds the completions of `futures` into `initial` using `combine`.
///
/// With `ordered = true` the fold sees values in input order; otherwise
/// values are folded in arrival order, serialized by a derived serial
/// executor, and the result is deterministic only if `combine` is
/// commutative up to the caller's needs.
pub fn reduce<T, A, F>(
    executor: &Executor,
    futures: Vec<Future<T>>,
    initial: A,
    ordered: bool,
    combine: F,
) -> Future<A>
where
    T: Clone + Send + 'static,
    A: Clone + Send + 'static,
    F: Fn(A, T) -> Result<A> + Send + Sync + 'static,
{
    if ordered {
        return joined(executor, futures).map(executor, move |values| {
            values
                .into_iter()
                .try_fold(initial, |accumulator, value| combine(accumulator, value))
        });
    }

    if futures.is_empty() {
        return Future::from_thunk(executor, move || Ok(initial));
    }

    let serial = executor.derived_serial();
    let promise = Promise::new();
    let aggregate = promise.future();
    let state = Arc::new(Lock::new(FoldState {
        accumulator: Some(initial),
        remaining: futures.len(),
        can_continue: true,
    }));

    let drain_state = Arc::clone(&state);
    promise.notify_drain(move || {
        drain_state.with(|state| state.can_continue = false);
    });

    let combine = Arc::new(combine);
    let weak = promise.downgrade();
    for future in futures {
        let state = Arc::clone(&state);
        let combine = Arc::clone(&combine);
        let weak = weak.clone();
        let receipt = future.make_final_handler(&serial, move |value: Fallible<T>| {
            let Some(promise) = weak.upgrade() else {
                return;
            };
            match value {
                Fallible::Success(value) => {
                    // Blocks on the serial executor never overlap, so the
                    // accumulator is always present here.
                    let Some(accumulator) = state.with(|state| {
                        state
                            .can_continue
                            .then(|| state.accumulator.take().expect("accumulator missing"))
                    }) else {
                        return;
                    };
                    match Fallible::from_thunk(|| combine(accumulator, value)) {
                        Fallible::Success(next) => {
                            let remaining = state.with(|state| {
                                state.remaining -= 1;
                                state.remaining
                            });
                            if remaining == 0 {
                                state.with(|state| state.can_continue = false);
                                promise.succeed(next);
                            } else {
                                state.with(|state| state.accumulator = Some(next));
                            }
                        }
                        Fallible::Failure(err) => {
                            state.with(|state| state.can_continue = false);
                            promise.fail(err);
                        }
                    }
                }
                Fallible::Failure(err) => {
                    let first =
                        state.with(|state| std::mem::replace(&mut state.can_continue, false));
                    if first {
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

/// Contextual [`reduce`]: folds on the context's executor and registers
/// the aggregate as a dependent, so context teardown cancels a pending
/// fold with `ContextDeallocated`.
pub fn reduce_with_context<T, A, F>(
    context: &ExecutionContext,
    futures: Vec<Future<T>>,
    initial: A,
    ordered: bool,
    combine: F,
) -> Future<A>
where
    T: Clone + Send + 'static,
    A: Clone + Send + 'static,
    F: Fn(A, T) -> Result<A> + Send + Sync + 'static,
{
    let aggregate = reduce(context.executor(), futures, initial, ordered, combine);
    context.add_dependent(&aggregate);
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn unordered_sum_is_deterministic() {
        let futures = vec![Future::value(1), Future::value(2), Future::value(3)];
        let sum = reduce(&Executor::primary(), futures, 0, false, |acc, n| Ok(acc + n));
        assert_eq!(sum.wait().lift_success().unwrap(), 6);
    }

    #[test]
    fn ordered_fold_sees_input_order() {
        let futures = vec![Future::value(1), Future::value(2), Future::value(3)];
        let digits = reduce(
            &Executor::primary(),
            futures,
            String::new(),
            true,
            |mut acc, n: i32| {
                acc.push_str(&n.to_string());
                Ok(acc)
            },
        );
        assert_eq!(digits.wait().lift_success().unwrap(), "123");
    }

    #[test]
    fn empty_input_yields_initial() {
        let sum = reduce(
            &Executor::immediate(),
            Vec::new(),
            10,
            false,
            |acc, n: i32| Ok(acc + n),
        );
        assert_eq!(sum.wait().lift_success().unwrap(), 10);
    }

    #[test]
    fn failing_input_fails_the_fold() {
        let pending: Promise<i32> = Promise::new();
        let futures = vec![Future::value(1), pending.future()];
        let sum = reduce(&Executor::primary(), futures, 0, false, |acc, n| Ok(acc + n));
        pending.fail(Error::cancelled());
        assert!(sum.wait().error().unwrap().is_cancelled());
    }

    #[test]
    fn raising_combine_fails_the_fold() {
        let futures = vec![Future::value(1), Future::value(2)];
        let sum: Future<i32> = reduce(&Executor::primary(), futures, 0, false, |_, _| {
            Err(Error::cancelled())
        });
        assert!(sum.wait().error().unwrap().is_cancelled());
    }

    #[test]
    fn late_arrivals_after_failure_are_ignored() {
        let late = Promise::new();
        let futures = vec![Future::error(Error::cancelled()), late.future()];
        let sum = reduce(&Executor::primary(), futures, 0, false, |acc, n| Ok(acc + n));
        assert!(sum.wait().error().unwrap().is_cancelled());
        late.succeed(2);
    }
}
