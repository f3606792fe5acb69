//! Time and delay helpers.
//!
//! Delays unite the timer driver, executors, promises, and cancellation
//! tokens: [`delay`] is a future that succeeds after a wall-clock
//! duration, and [`cancel_after`] expresses timeouts the way the library
//! means them to be expressed — by scheduling `cancel` on a token rather
//! than by a separate timeout primitive. Bind the work's future to the
//! token and the timeout falls out of cancellation propagation.

use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::executor::Executor;
use crate::future::Future;

/// A future that succeeds with `()` on `executor` after `duration`.
#[must_use]
pub fn delay(executor: &Executor, duration: Duration) -> Future<()> {
    Future::after(executor, duration, None, || Ok(()))
}

/// Schedules `token.cancel()` after `duration`.
///
/// Registrants cancelled this way observe the cancellation on the timer
/// driver's thread.
pub fn cancel_after(token: &CancellationToken, duration: Duration) {
    let token = token.clone();
    Executor::immediate().execute_after(duration, move || token.cancel());
}

/// A fresh token that fires after `duration`.
///
/// Convenience for the common "give this work N seconds" shape.
#[must_use]
pub fn deadline_token(duration: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    cancel_after(&token, duration);
    token
}
