//! Execution context lifetime suite.
//!
//! Context teardown is the third way a future completes: dependents of a
//! dropped context fail with `ContextDeallocated`, contextual thunks and
//! transforms are never run without a live collaborator, and handler
//! receipts anchored in the context's release pool die with it.

mod common;

use common::*;
use pactum::{
    joined_with_context, CachedValue, ExecutionContext, Executor, Future, Promise,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn pending_dependent_fails_on_teardown() {
    init_test_logging();
    pactum::test_phase!("dependent teardown");

    let promise: Promise<i32> = Promise::new();
    {
        let context = ExecutionContext::new(Executor::primary());
        context.add_dependent(&promise.future());
    }
    assert!(promise.future().wait().error().unwrap().is_context_deallocated());
}

#[test]
fn delayed_contextual_thunk_never_runs_after_drop() {
    init_test_logging();
    pactum::test_phase!("delayed contextual thunk");

    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);
    let future = {
        let context = ExecutionContext::new(Executor::primary());
        Future::after_with_context(&context, Duration::from_millis(50), None, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        // context dropped here, before the timer fires
    };

    assert!(future.wait().error().unwrap().is_context_deallocated());
    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(ran.load(Ordering::SeqCst), 0, "thunk ran without a collaborator");
}

#[test]
fn contextual_map_fails_downstream_when_context_dies_first() {
    init_test_logging();

    let upstream: Promise<i32> = Promise::new();
    let downstream = {
        let context = ExecutionContext::new(Executor::primary());
        upstream
            .future()
            .map_with_context(&context, &Executor::primary(), |_, n| Ok(n + 1))
    };

    // The upstream completes after the collaborator is gone.
    upstream.succeed(1);
    assert!(downstream.wait().error().unwrap().is_context_deallocated());
}

#[test]
fn contextual_map_runs_while_context_lives() {
    init_test_logging();

    let context = ExecutionContext::new(Executor::primary());
    let upstream: Promise<i32> = Promise::new();
    let downstream = upstream
        .future()
        .map_with_context(&context, &Executor::primary(), |context, n| {
            assert_eq!(context.executor().label(), "qos:default");
            Ok(n + 1)
        });

    upstream.succeed(41);
    assert_eq!(downstream.wait().lift_success().unwrap(), 42);
}

#[test]
fn release_pool_anchors_die_with_the_context() {
    init_test_logging();

    let promise: Promise<i32> = Promise::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let context = ExecutionContext::new(Executor::primary());
        let d = Arc::clone(&delivered);
        if let Some(receipt) = promise
            .future()
            .make_final_handler(&Executor::primary(), move |_| {
                d.fetch_add(1, Ordering::SeqCst);
            })
        {
            context.release_pool().insert(receipt);
        }
    }

    promise.succeed(1);
    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
}

#[test]
fn aggregates_bound_to_a_context_cancel_on_teardown() {
    init_test_logging();

    let never: Promise<i32> = Promise::new();
    let aggregate = {
        let context = ExecutionContext::new(Executor::primary());
        joined_with_context(&context, vec![Future::value(1), never.future()])
    };
    assert!(aggregate.wait().error().unwrap().is_context_deallocated());
}

#[test]
fn flat_with_context_checks_liveness_at_dispatch() {
    init_test_logging();

    let gate = Arc::new(std::sync::Barrier::new(2));
    let produced = Arc::new(AtomicUsize::new(0));

    // Park the main thread so the thunk dispatches only after the
    // context has been dropped.
    let g = Arc::clone(&gate);
    Executor::main().execute(move || {
        g.wait();
    });

    let p = Arc::clone(&produced);
    let future = {
        let context = ExecutionContext::new(Executor::main());
        Future::flat_with_context(&context, move |_| {
            p.fetch_add(1, Ordering::SeqCst);
            Ok(Future::value(1))
        })
    };
    gate.wait();

    assert!(future.wait().error().unwrap().is_context_deallocated());
    assert_eq!(produced.load(Ordering::SeqCst), 0);
}

#[test]
fn clones_share_one_lifetime() {
    init_test_logging();

    let context = ExecutionContext::new(Executor::primary());
    let clone = context.clone();
    let cache = CachedValue::new(&context, |_| Ok(Future::value(5)));

    drop(context);
    // The clone still holds the collaborator alive.
    assert_eq!(cache.value().wait().lift_success().unwrap(), 5);

    drop(clone);
    cache.invalidate();
    assert!(cache.value().wait().error().unwrap().is_context_deallocated());
}
