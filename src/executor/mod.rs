//! Executors: where submitted blocks run.
//!
//! An [`Executor`] is a cheap, cloneable handle around a submission policy.
//! Three families exist:
//!
//! - **Immediate** — runs the block inline on the calling thread.
//! - **Pooled** — submits to the shared [`WorkerPool`]; blocks may run
//!   concurrently with each other.
//! - **Serial** — created with [`Executor::derived_serial`]; submissions are
//!   totally ordered and never overlap, draining on the parent executor.
//!
//! Submission cannot fail. Identity is observable: two handles compare
//! equal with [`Executor::same`] exactly when they are the same executor,
//! which is what lets callers assert "this callback runs where I asked".
//!
//! # Presets
//!
//! The process-wide presets are lazily initialized singletons:
//! [`Executor::immediate`], [`Executor::main`] (a dedicated thread),
//! [`Executor::primary`] (alias for the default-QoS pooled executor) and
//! one pooled executor per [`QosClass`]. All QoS executors share one
//! worker pool; the classes exist for placement decisions and as distinct
//! identities, which keeps the library portable to hosts without
//! priority-tiered pools.

mod pool;
mod serial;
mod timer;

pub use pool::{Job, PoolHandle, WorkerPool};

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::tracing_compat::debug;
use serial::SerialQueue;

/// Quality-of-service classes for the pooled presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QosClass {
    /// Work the user is actively waiting on, frame-by-frame.
    UserInteractive,
    /// Work the user initiated and expects promptly.
    UserInitiated,
    /// The default class; also reachable as [`Executor::primary`].
    Default,
    /// Long-running work the user is not waiting on.
    Utility,
    /// Maintenance and prefetching.
    Background,
    /// No stated preference; scheduled like default work.
    Unspecified,
}

impl QosClass {
    const ALL: [Self; 6] = [
        Self::UserInteractive,
        Self::UserInitiated,
        Self::Default,
        Self::Utility,
        Self::Background,
        Self::Unspecified,
    ];

    const fn index(self) -> usize {
        match self {
            Self::UserInteractive => 0,
            Self::UserInitiated => 1,
            Self::Default => 2,
            Self::Utility => 3,
            Self::Background => 4,
            Self::Unspecified => 5,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::UserInteractive => "qos:user-interactive",
            Self::UserInitiated => "qos:user-initiated",
            Self::Default => "qos:default",
            Self::Utility => "qos:utility",
            Self::Background => "qos:background",
            Self::Unspecified => "qos:unspecified",
        }
    }
}

enum Flavor {
    Immediate,
    Pooled(PoolHandle),
    Serial(Arc<SerialQueue>),
}

struct ExecutorInner {
    flavor: Flavor,
    label: &'static str,
}

/// A scheduler that runs submitted blocks.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("label", &self.inner.label)
            .finish()
    }
}

impl Executor {
    /// The executor that runs blocks inline on the calling thread.
    #[must_use]
    pub fn immediate() -> Self {
        static IMMEDIATE: OnceLock<Executor> = OnceLock::new();
        IMMEDIATE
            .get_or_init(|| Self::with_flavor(Flavor::Immediate, "immediate"))
            .clone()
    }

    /// The default pooled executor. Alias for `Executor::qos(QosClass::Default)`.
    #[must_use]
    pub fn primary() -> Self {
        Self::qos(QosClass::Default)
    }

    /// A dedicated serial thread, lazily spawned on first use.
    ///
    /// Plays the role a host UI thread would; on a server this is simply a
    /// well-known serial executor.
    #[must_use]
    pub fn main() -> Self {
        static MAIN: OnceLock<Executor> = OnceLock::new();
        MAIN.get_or_init(|| {
            let pool = main_pool();
            Self::with_flavor(Flavor::Pooled(pool.handle()), "main")
        })
        .clone()
    }

    /// The pooled executor for a quality-of-service class.
    ///
    /// Each class is a distinct identity; all share the global worker pool.
    #[must_use]
    pub fn qos(class: QosClass) -> Self {
        static PRESETS: OnceLock<[Executor; 6]> = OnceLock::new();
        PRESETS.get_or_init(|| {
            let pool = global_pool();
            QosClass::ALL
                .map(|class| Executor::with_flavor(Flavor::Pooled(pool.handle()), class.label()))
        })[class.index()]
        .clone()
    }

    fn with_flavor(flavor: Flavor, label: &'static str) -> Self {
        Self {
            inner: Arc::new(ExecutorInner { flavor, label }),
        }
    }

    /// Returns true when both handles denote the same executor.
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Returns true for the immediate executor.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        matches!(self.inner.flavor, Flavor::Immediate)
    }

    /// A short human-readable label, used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    /// Schedules `block` per this executor's policy.
    ///
    /// Only the immediate executor runs the block synchronously on the
    /// calling thread.
    pub fn execute<F>(&self, block: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute_boxed(Box::new(block));
    }

    /// Schedules an already-boxed block.
    pub fn execute_boxed(&self, job: Job) {
        match &self.inner.flavor {
            Flavor::Immediate => job(),
            Flavor::Pooled(handle) => handle.submit(job),
            Flavor::Serial(queue) => queue.submit(job),
        }
    }

    /// Schedules `block` after a wall-clock delay.
    ///
    /// The delay itself is not cancellable through the executor; guard the
    /// block's effect with a
    /// [`CancellationToken`](crate::cancel::CancellationToken) when it must
    /// be pre-emptible.
    pub fn execute_after<F>(&self, delay: Duration, block: F)
    where
        F: FnOnce() + Send + 'static,
    {
        timer::schedule(delay, self.clone(), Box::new(block));
    }

    /// Returns a new executor whose submissions are totally ordered and
    /// never run concurrently, draining on `self`.
    ///
    /// Combinators use this to replace locks around their accumulators.
    #[must_use]
    pub fn derived_serial(&self) -> Self {
        debug!(parent = self.inner.label, "deriving serial executor");
        Self::with_flavor(
            Flavor::Serial(Arc::new(SerialQueue::new(self.clone()))),
            "serial",
        )
    }
}

fn global_pool() -> &'static WorkerPool {
    static POOL: OnceLock<WorkerPool> = OnceLock::new();
    POOL.get_or_init(|| {
        let config = PoolConfig::from_env().unwrap_or_else(|err| {
            debug!(%err, "ignoring malformed pool configuration from environment");
            PoolConfig::default()
        });
        WorkerPool::new(config)
    })
}

fn main_pool() -> &'static WorkerPool {
    static POOL: OnceLock<WorkerPool> = OnceLock::new();
    POOL.get_or_init(|| {
        WorkerPool::new(
            PoolConfig::default()
                .with_threads(1, 1)
                .with_thread_name_prefix("pactum-main"),
        )
    })
}
