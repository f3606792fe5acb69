//! Worker pool executing submitted blocks.
//!
//! The pool manages a set of OS threads that drain a shared injector queue.
//! Pooled executors submit blocks here; the pool guarantees every submitted
//! block eventually runs (or, on shutdown with work still queued, trips a
//! debug assertion — a dropped block is a programming error).
//!
//! # Thread Lifecycle
//!
//! Threads are spawned lazily up to `max_threads`. When idle beyond the
//! configured timeout, threads above `min_threads` retire. Blocks are
//! executed under `catch_unwind` so a panicking block cannot take a worker
//! thread down with it; the panic is logged and swallowed, matching the
//! library-wide rule that nothing unwinds across an executor boundary.

use crossbeam_queue::SegQueue;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle as ThreadJoinHandle};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::tracing_compat::{debug, warn};

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The worker pool behind pooled executors.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

/// A cloneable handle to a [`WorkerPool`].
///
/// Executors hold handles; the pool itself is owned by whoever spawned it
/// (for the global presets, a process-wide singleton).
#[derive(Clone)]
pub struct PoolHandle {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Minimum number of threads to keep alive.
    min_threads: usize,
    /// Maximum number of threads allowed.
    max_threads: usize,
    /// Current number of live threads.
    active_threads: AtomicUsize,
    /// Number of threads currently executing a block.
    busy_threads: AtomicUsize,
    /// Number of queued blocks not yet picked up.
    pending_count: AtomicUsize,
    /// Injector queue.
    queue: SegQueue<Job>,
    /// Shutdown flag.
    shutdown: AtomicBool,
    /// Condition variable for thread parking.
    condvar: Condvar,
    /// Mutex for the condition variable.
    mutex: Mutex<()>,
    /// Idle timeout for excess threads.
    idle_timeout: Duration,
    /// Thread name prefix.
    thread_name_prefix: String,
    /// Thread join handles for cleanup.
    thread_handles: Mutex<Vec<ThreadJoinHandle<()>>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("min_threads", &self.inner.min_threads)
            .field("max_threads", &self.inner.max_threads)
            .field(
                "active_threads",
                &self.inner.active_threads.load(Ordering::Relaxed),
            )
            .field(
                "pending_jobs",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field(
                "active_threads",
                &self.inner.active_threads.load(Ordering::Relaxed),
            )
            .field(
                "pending_jobs",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl WorkerPool {
    /// Creates a new pool from a configuration.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is 0.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        assert!(config.max_threads > 0, "max_threads must be at least 1");
        let max_threads = config.max_threads.max(config.min_threads);

        let inner = Arc::new(PoolInner {
            min_threads: config.min_threads,
            max_threads,
            active_threads: AtomicUsize::new(0),
            busy_threads: AtomicUsize::new(0),
            pending_count: AtomicUsize::new(0),
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
            idle_timeout: config.idle_timeout,
            thread_name_prefix: config.thread_name_prefix,
            thread_handles: Mutex::new(Vec::with_capacity(max_threads)),
        });

        let pool = Self { inner };
        for _ in 0..pool.inner.min_threads {
            spawn_thread(&pool.inner);
        }
        pool
    }

    /// Returns a cloneable handle to this pool.
    #[must_use]
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Submits a block for execution.
    pub fn submit(&self, job: Job) {
        submit_on(&self.inner, job);
    }

    /// Returns the number of queued blocks not yet picked up.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Returns the number of live worker threads.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Relaxed)
    }

    /// Returns `true` if the pool is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Initiates shutdown. Queued blocks still run; new submissions after
    /// shutdown are a programming error.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _guard = self
            .inner
            .mutex
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.inner.condvar.notify_all();
    }

    /// Shuts down and waits for all threads to exit.
    ///
    /// Returns `true` if all threads exited before `timeout` elapsed.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();

        let deadline = std::time::Instant::now() + timeout;
        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            {
                let _guard = self
                    .inner
                    .mutex
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                self.inner.condvar.notify_all();
            }
            thread::sleep(Duration::from_millis(5).min(remaining));
        }

        let mut handles = self
            .inner
            .thread_handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for handle in handles.drain(..) {
            let _ = handle.join();
        }

        debug_assert!(
            self.inner.queue.is_empty(),
            "worker pool shut down with blocks still queued"
        );
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown_and_wait(Duration::from_secs(5));
    }
}

impl PoolHandle {
    /// Submits a block for execution.
    pub fn submit(&self, job: Job) {
        submit_on(&self.inner, job);
    }

    /// Returns `true` if the pool is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

fn submit_on(inner: &Arc<PoolInner>, job: Job) {
    debug_assert!(
        !inner.shutdown.load(Ordering::Acquire),
        "block submitted to a pool that is shut down"
    );
    inner.queue.push(job);
    inner.pending_count.fetch_add(1, Ordering::Relaxed);

    maybe_spawn_thread(inner);
    let _guard = inner
        .mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    inner.condvar.notify_one();
}

fn spawn_thread(inner: &Arc<PoolInner>) {
    let inner_clone = Arc::clone(inner);
    let thread_id = inner.active_threads.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-worker-{}", inner.thread_name_prefix, thread_id);

    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || {
            worker_loop(&inner_clone);
            inner_clone.active_threads.fetch_sub(1, Ordering::Relaxed);
        })
        .expect("failed to spawn worker thread");

    inner
        .thread_handles
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .push(handle);
}

fn maybe_spawn_thread(inner: &Arc<PoolInner>) {
    let active = inner.active_threads.load(Ordering::Relaxed);
    let busy = inner.busy_threads.load(Ordering::Relaxed);
    let pending = inner.pending_count.load(Ordering::Relaxed);

    // Grow only when every live thread is occupied and work is waiting.
    if active < inner.max_threads && busy >= active && pending > 0 {
        debug!(active, pending, "growing worker pool");
        spawn_thread(inner);
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(job) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);
            inner.busy_threads.fetch_add(1, Ordering::Relaxed);
            if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                let _ = payload;
                warn!("submitted block panicked; worker thread survives");
            }
            inner.busy_threads.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let active = inner.active_threads.load(Ordering::Relaxed);
        if active > inner.min_threads {
            let guard = inner
                .mutex
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let (_guard, result) = inner
                .condvar
                .wait_timeout(guard, inner.idle_timeout)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if result.timed_out()
                && inner.queue.is_empty()
                && inner.active_threads.load(Ordering::Relaxed) > inner.min_threads
            {
                debug!("idle worker retiring");
                break;
            }
        } else {
            let guard = inner
                .mutex
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let _guard = inner
                .condvar
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}
