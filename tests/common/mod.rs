#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

pub use pactum::test_utils::{init_test_logging, wait_until, TestError};

use std::time::Duration;

/// Generous bound for anything that should complete promptly.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short delay used when a test needs wall-clock separation.
pub const SHORT_DELAY: Duration = Duration::from_millis(40);
