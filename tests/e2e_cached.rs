//! Cached value end-to-end suite.
//!
//! Covers the single-flight cache against a real pool: slow miss
//! handlers shared by many callers, failure caching, and the
//! recompute-after-invalidate cycle driven from a mutable source.

mod common;

use common::*;
use pactum::{CachedValue, ExecutionContext, Executor, Future, Promise};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn slow_value_future(value: i32, delay: Duration) -> Future<i32> {
    let promise = Promise::new();
    let weak = promise.downgrade();
    Executor::primary().execute_after(delay, move || {
        if let Some(promise) = weak.upgrade() {
            promise.succeed(value);
        }
    });
    promise.future()
}

#[test]
fn single_shot_cache_success() {
    init_test_logging();
    pactum::test_phase!("single-shot success");

    let context = ExecutionContext::new(Executor::primary());
    let invocations = Arc::new(AtomicUsize::new(0));
    let n = Arc::clone(&invocations);
    let cache = CachedValue::new(&context, move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        Ok(slow_value_future(17, Duration::from_millis(60)))
    });

    let first = cache.value();
    assert_eq!(first.wait().lift_success().unwrap(), 17);

    let second = cache.value();
    assert!(Future::same(&first, &second), "cache must return the same future");
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn single_shot_cache_failure_is_sticky() {
    init_test_logging();

    let context = ExecutionContext::new(Executor::primary());
    let cache: CachedValue<i32> =
        CachedValue::new(&context, |_| Err(TestError("miss failed").into_error()));

    let first = cache.value();
    assert_eq!(
        first.wait().error().unwrap().kind(),
        pactum::ErrorKind::User
    );

    let second = cache.value();
    assert!(Future::same(&first, &second), "failed future must stay cached");
}

#[test]
fn multi_use_cache_recomputes_after_invalidate() {
    init_test_logging();
    pactum::test_phase!("multi-use cache");

    let context = ExecutionContext::new(Executor::primary());
    let cell = Arc::new(AtomicI32::new(100));

    let source = Arc::clone(&cell);
    let cache = CachedValue::new(&context, move |_| {
        let value = source.load(Ordering::SeqCst);
        Ok(Future::from_thunk(&Executor::primary(), move || Ok(value)))
    });

    let first = cache.value();
    assert_eq!(first.wait().lift_success().unwrap(), 100);

    cell.store(200, Ordering::SeqCst);
    cache.invalidate();

    let second = cache.value();
    assert!(!Future::same(&first, &second), "invalidate must change identity");
    assert_eq!(second.wait().lift_success().unwrap(), 200);

    // The old future keeps its old value.
    assert_eq!(first.wait().lift_success().unwrap(), 100);
}

#[test]
fn many_concurrent_callers_one_flight() {
    init_test_logging();

    let context = ExecutionContext::new(Executor::primary());
    let invocations = Arc::new(AtomicUsize::new(0));
    let n = Arc::clone(&invocations);
    let cache = Arc::new(CachedValue::new(&context, move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        Ok(slow_value_future(5, Duration::from_millis(50)))
    }));

    let mut callers = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        callers.push(std::thread::spawn(move || {
            cache.value().wait().lift_success().unwrap()
        }));
    }
    for caller in callers {
        assert_eq!(caller.join().expect("caller panicked"), 5);
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn cache_fails_cleanly_once_context_is_gone() {
    init_test_logging();

    let cache: CachedValue<i32> = {
        let context = ExecutionContext::new(Executor::primary());
        CachedValue::new(&context, |_| Ok(Future::value(1)))
    };

    assert!(cache
        .value()
        .wait()
        .error()
        .expect("expected failure")
        .is_context_deallocated());
}

#[test]
fn invalidate_does_not_cancel_the_inflight_computation() {
    init_test_logging();

    let context = ExecutionContext::new(Executor::primary());
    let cache = CachedValue::new(&context, |_| {
        Ok(slow_value_future(9, Duration::from_millis(80)))
    });

    let inflight = cache.value();
    cache.invalidate();

    // The caller that grabbed the pre-invalidation future still sees it
    // complete normally.
    assert_eq!(inflight.wait().lift_success().unwrap(), 9);
}
