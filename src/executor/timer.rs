//! Timer driver for delayed submission.
//!
//! A single lazily-spawned driver thread owns a min-heap of
//! `(deadline, block, executor)` entries. When an entry comes due, the
//! block is submitted to its executor; the driver thread itself never runs
//! user blocks. Delays are wall-clock and not cancellable here —
//! cancellation lives on the token that guards whatever the block does.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use super::pool::Job;
use super::Executor;
use crate::tracing_compat::trace;

struct TimerEntry {
    deadline: Instant,
    generation: u64,
    job: Job,
    executor: Executor,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering for min-heap (earliest deadline first);
        // generation breaks ties so equal deadlines fire in schedule order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct DriverState {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

struct TimerDriver {
    state: Mutex<DriverState>,
    wakeup: Condvar,
}

static DRIVER: OnceLock<TimerDriver> = OnceLock::new();

fn driver() -> &'static TimerDriver {
    DRIVER.get_or_init(|| {
        thread::Builder::new()
            .name("pactum-timer".to_string())
            .spawn(driver_loop)
            .expect("failed to spawn timer thread");
        TimerDriver {
            state: Mutex::new(DriverState::default()),
            wakeup: Condvar::new(),
        }
    })
}

/// Schedules `job` for submission to `executor` after `delay`.
pub(super) fn schedule(delay: Duration, executor: Executor, job: Job) {
    let driver = driver();
    let deadline = Instant::now() + delay;
    {
        let mut state = driver
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let generation = state.next_generation;
        state.next_generation += 1;
        state.heap.push(TimerEntry {
            deadline,
            generation,
            job,
            executor,
        });
    }
    driver.wakeup.notify_one();
}

fn driver_loop() {
    let driver = driver();
    let mut state = driver
        .state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    loop {
        let now = Instant::now();
        let mut due = Vec::new();
        while state
            .heap
            .peek()
            .is_some_and(|entry| entry.deadline <= now)
        {
            if let Some(entry) = state.heap.pop() {
                due.push(entry);
            }
        }

        if !due.is_empty() {
            drop(state);
            trace!(count = due.len(), "timer entries due");
            for entry in due {
                entry.executor.execute_boxed(entry.job);
            }
            state = driver
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            continue;
        }

        state = match state.heap.peek().map(|entry| entry.deadline) {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(now);
                driver
                    .wakeup
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .0
            }
            None => driver
                .wakeup
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        };
    }
}
