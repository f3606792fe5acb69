//! Collection combinator end-to-end suite.
//!
//! Validates the aggregate invariants on real pool threads:
//! - order preservation regardless of arrival order
//! - first-failure-wins short-circuiting
//! - empty-input fast paths
//! - the unordered reduce relying on a derived serial executor instead
//!   of a lock around its accumulator

mod common;

use common::*;
use pactum::{
    async_flat_map, async_map, joined, reduce, Executor, Future, Promise,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn delayed(value: i32, delay_ms: u64) -> Future<i32> {
    Future::after(
        &Executor::primary(),
        Duration::from_millis(delay_ms),
        None,
        move || Ok(value),
    )
}

#[test]
fn joined_orders_results_by_input_not_arrival() {
    init_test_logging();
    pactum::test_phase!("joined ordering");

    let all = joined(
        &Executor::primary(),
        vec![delayed(1, 60), delayed(2, 10), delayed(3, 30)],
    );
    assert_eq!(all.wait().lift_success().unwrap(), vec![1, 2, 3]);
}

#[test]
fn joined_failure_wins_regardless_of_arrival_order() {
    init_test_logging();

    let failing: Promise<i32> = Promise::new();
    let all = joined(
        &Executor::primary(),
        vec![delayed(1, 10), failing.future(), delayed(3, 10)],
    );

    std::thread::sleep(Duration::from_millis(40));
    failing.fail(TestError("joined").into_error());

    assert_eq!(all.wait().error().unwrap().kind(), pactum::ErrorKind::User);
}

#[test]
fn unordered_reduce_needs_no_lock_and_is_deterministic() {
    init_test_logging();
    pactum::test_phase!("unordered reduce");

    // Deliberately staggered completions: arrival order differs from
    // input order, the sum does not.
    let sum = reduce(
        &Executor::primary(),
        vec![delayed(1, 50), delayed(2, 5), delayed(3, 25)],
        0,
        false,
        |accumulator, n| Ok(accumulator + n),
    );
    assert_eq!(sum.wait().lift_success().unwrap(), 6);
}

#[test]
fn ordered_reduce_folds_in_input_order() {
    init_test_logging();

    let folded = reduce(
        &Executor::primary(),
        vec![delayed(1, 40), delayed(2, 5), delayed(3, 20)],
        String::new(),
        true,
        |mut accumulator, n| {
            accumulator.push_str(&n.to_string());
            Ok(accumulator)
        },
    );
    assert_eq!(folded.wait().lift_success().unwrap(), "123");
}

#[test]
fn reduce_stops_consuming_after_a_failure() {
    init_test_logging();

    let combined = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&combined);
    let outcome = reduce(
        &Executor::primary(),
        vec![
            Future::error(TestError("first").into_error()),
            delayed(2, 30),
            delayed(3, 30),
        ],
        0,
        false,
        move |accumulator, n| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(accumulator + n)
        },
    );

    assert_eq!(outcome.wait().error().unwrap().kind(), pactum::ErrorKind::User);
    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(
        combined.load(Ordering::SeqCst),
        0,
        "combine ran after the fold had already failed"
    );
}

#[test]
fn async_map_runs_transforms_in_parallel_and_orders_results() {
    init_test_logging();

    let started = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&started);
    let mapped = async_map(
        &Executor::primary(),
        vec![30_u64, 20, 10],
        move |delay| {
            s.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(delay));
            Ok(delay * 2)
        },
    );
    assert_eq!(mapped.wait().lift_success().unwrap(), vec![60, 40, 20]);
    assert_eq!(started.load(Ordering::SeqCst), 3);
}

#[test]
fn async_map_empty_input_completes_on_requesting_executor() {
    init_test_logging();

    let empty: Future<Vec<i32>> = async_map(&Executor::primary(), Vec::<i32>::new(), Ok);
    assert!(empty.wait().lift_success().unwrap().is_empty());

    let empty_joined: Future<Vec<i32>> = joined(&Executor::primary(), Vec::new());
    assert!(empty_joined.wait().lift_success().unwrap().is_empty());
}

#[test]
fn async_flat_map_mixes_immediate_and_delayed_futures() {
    init_test_logging();

    let nested = async_flat_map(&Executor::primary(), vec![1, 2, 3], |n| {
        if n % 2 == 0 {
            Ok(Future::value(n * 100))
        } else {
            Ok(delayed(n * 100, 30))
        }
    });
    assert_eq!(nested.wait().lift_success().unwrap(), vec![100, 200, 300]);
}

#[test]
fn async_flat_map_first_inner_failure_wins() {
    init_test_logging();

    let outcome: Future<Vec<i32>> = async_flat_map(&Executor::primary(), vec![1, 2, 3], |n| {
        if n == 2 {
            Ok(Future::error(TestError("inner").into_error()))
        } else {
            Ok(delayed(n, 40))
        }
    });
    assert_eq!(outcome.wait().error().unwrap().kind(), pactum::ErrorKind::User);
}

#[test]
fn drained_aggregate_elides_pending_transforms() {
    init_test_logging();

    let ran = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(std::sync::Barrier::new(2));

    // Single-threaded main executor: the first item parks on the gate,
    // the rest cannot start until the aggregate is gone.
    let r = Arc::clone(&ran);
    let g = Arc::clone(&gate);
    let aggregate = async_map(&Executor::main(), vec![0, 1, 2, 3], move |n| {
        if n == 0 {
            g.wait();
        }
        r.fetch_add(1, Ordering::SeqCst);
        Ok(n)
    });

    drop(aggregate);
    gate.wait();

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        ran.load(Ordering::SeqCst),
        1,
        "transforms ran for a drained aggregate"
    );
}
