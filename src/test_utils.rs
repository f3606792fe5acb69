//! Test utilities for pactum.
//!
//! Shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase macro for readable test output
//! - Assertion macro that logs expected/actual before asserting
//! - Small fixtures (event counters, deliberate test errors)

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Error;

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
#[cfg(feature = "tracing-integration")]
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
#[cfg(feature = "tracing-integration")]
pub fn init_test_logging_with_level(level: tracing::Level) {
    use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// No-op when tracing integration is disabled.
#[cfg(not(feature = "tracing-integration"))]
pub fn init_test_logging() {}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::info!(phase = %$name, "==== TEST PHASE: {} ====", $name);
    };
}

/// Log expected/actual before asserting.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        $crate::tracing_compat::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// A deliberate error for exercising failure paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub &'static str);

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test error: {}", self.0)
    }
}

impl std::error::Error for TestError {}

impl TestError {
    /// Wraps this test error as a library [`Error`].
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::user(self)
    }
}

/// Counts recorded events across threads; a tiny fixture for asserting
/// "ran exactly N times" without a lock.
#[derive(Clone, Debug)]
pub struct SubmissionCounter {
    submitted: Arc<AtomicUsize>,
}

impl Default for SubmissionCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            submitted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Records one event.
    pub fn record(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    /// The number of events recorded so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

/// Spin until `predicate` holds or `timeout` elapses; true on success.
pub fn wait_until(timeout: std::time::Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while !predicate() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::yield_now();
    }
    true
}
