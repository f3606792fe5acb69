//! Worker pool configuration.
//!
//! The global preset executors share one worker pool whose sizing can be
//! tuned programmatically or through environment variables. Settings are
//! resolved in this order (highest priority first):
//!
//! 1. **Programmatic** — a [`PoolConfig`] passed to
//!    [`WorkerPool::new`](crate::executor::WorkerPool::new)
//! 2. **Environment variables** — `PACTUM_*` values via
//!    [`PoolConfig::from_env`]
//! 3. **Defaults** — [`PoolConfig::default`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PACTUM_MIN_THREADS` | `usize` | `min_threads` |
//! | `PACTUM_MAX_THREADS` | `usize` | `max_threads` |
//! | `PACTUM_IDLE_TIMEOUT_MS` | `u64` | `idle_timeout` |
//! | `PACTUM_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |

use std::time::Duration;

/// Environment variable name for the pool's minimum thread count.
pub const ENV_MIN_THREADS: &str = "PACTUM_MIN_THREADS";
/// Environment variable name for the pool's maximum thread count.
pub const ENV_MAX_THREADS: &str = "PACTUM_MAX_THREADS";
/// Environment variable name for the idle timeout in milliseconds.
pub const ENV_IDLE_TIMEOUT_MS: &str = "PACTUM_IDLE_TIMEOUT_MS";
/// Environment variable name for the worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "PACTUM_THREAD_NAME_PREFIX";

/// Default idle timeout before retiring excess worker threads.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error produced when an environment variable holds an unparseable value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric variable did not parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// The variable that failed to parse.
        var: &'static str,
        /// The raw value found in the environment.
        value: String,
    },
    /// Minimum thread count exceeds the maximum.
    #[error("min_threads ({min}) exceeds max_threads ({max})")]
    InvertedBounds {
        /// Configured minimum.
        min: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// Sizing and naming for a [`WorkerPool`](crate::executor::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Minimum number of worker threads kept alive.
    pub min_threads: usize,
    /// Maximum number of worker threads allowed.
    pub max_threads: usize,
    /// Idle time after which excess threads retire.
    pub idle_timeout: Duration,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let parallelism =
            std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
        Self {
            min_threads: 1,
            max_threads: parallelism,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            thread_name_prefix: "pactum".to_string(),
        }
    }
}

impl PoolConfig {
    /// Builds a configuration from the environment, falling back to
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but unparseable, or if
    /// the resolved bounds are inverted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(val) = read_env(ENV_MIN_THREADS) {
            config.min_threads = parse_usize(ENV_MIN_THREADS, &val)?;
        }
        if let Some(val) = read_env(ENV_MAX_THREADS) {
            config.max_threads = parse_usize(ENV_MAX_THREADS, &val)?;
        }
        if let Some(val) = read_env(ENV_IDLE_TIMEOUT_MS) {
            config.idle_timeout = Duration::from_millis(parse_u64(ENV_IDLE_TIMEOUT_MS, &val)?);
        }
        if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
            config.thread_name_prefix = val;
        }
        if config.min_threads > config.max_threads {
            return Err(ConfigError::InvertedBounds {
                min: config.min_threads,
                max: config.max_threads,
            });
        }
        Ok(config)
    }

    /// Sets the thread bounds.
    #[must_use]
    pub fn with_threads(mut self, min: usize, max: usize) -> Self {
        self.min_threads = min;
        self.max_threads = max;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

fn read_env(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_usize(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}
