//! Fan-out cancellation tokens.
//!
//! A [`CancellationToken`] is a shared signal with two states, not
//! cancelled and cancelled. Cancellables register with a token; firing it
//! transitions the state and synchronously invokes [`Cancellable::cancel`]
//! on every registrant, on the thread that called
//! [`CancellationToken::cancel`]. Registration after firing cancels the
//! registrant before `add` returns, so late registrants observe the same
//! contract as early ones.
//!
//! The token holds registrants weakly. A future that has been dropped by
//! every consumer simply disappears from the registry; cancellation never
//! resurrects it.
//!
//! Cancellation is cooperative: work already inside a running block is not
//! preempted, but its eventual result is discarded because the guarded
//! future has already completed with `Cancelled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::sync::Lock;
use crate::tracing_compat::debug;

/// An object that can be cancelled by a fired token.
///
/// Implemented by the future/promise core; `cancel` must be idempotent
/// and must tolerate being called from any thread.
pub trait Cancellable: Send + Sync {
    /// Requests cancellation.
    fn cancel(&self);
}

struct TokenInner {
    cancelled: AtomicBool,
    members: Lock<Vec<Weak<dyn Cancellable>>>,
}

/// A shared cancellation signal bound to a set of [`Cancellable`]s.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                members: Lock::new(Vec::new()),
            }),
        }
    }

    /// Registers a cancellable with this token.
    ///
    /// The registration is weak. If the token has already fired, the
    /// member is cancelled synchronously before `add` returns and is not
    /// registered.
    pub fn add(&self, member: &Arc<dyn Cancellable>) {
        if self.is_cancelled() {
            member.cancel();
            return;
        }
        self.inner.members.with(|members| {
            members.retain(|weak| weak.strong_count() > 0);
            members.push(Arc::downgrade(member));
        });
        // Racing with a concurrent cancel(): the firing thread may have
        // drained the registry before our push landed. Re-check and settle.
        if self.is_cancelled() {
            member.cancel();
        }
    }

    /// Fires the token. Idempotent.
    ///
    /// Every currently registered member is cancelled synchronously on the
    /// calling thread, with the registry lock released.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let members = self.inner.members.with(std::mem::take);
        debug!(members = members.len(), "cancellation token fired");
        for weak in members {
            if let Some(member) = weak.upgrade() {
                member.cancel();
            }
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("members", &self.inner.members.with(|members| members.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Flag {
        cancelled: AtomicUsize,
    }

    impl Flag {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                cancelled: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    impl Cancellable for Flag {
        fn cancel(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn cancel_reaches_every_member() {
        let token = CancellationToken::new();
        let flags: Vec<_> = (0..4).map(|_| Flag::new()).collect();
        for flag in &flags {
            let member: Arc<dyn Cancellable> = Arc::clone(flag) as Arc<dyn Cancellable>;
            token.add(&member);
        }

        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        for flag in &flags {
            assert_eq!(flag.count(), 1);
        }
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancellationToken::new();
        let flag = Flag::new();
        let member: Arc<dyn Cancellable> = Arc::clone(&flag) as Arc<dyn Cancellable>;
        token.add(&member);

        token.cancel();
        token.cancel();
        assert_eq!(flag.count(), 1);
    }

    #[test]
    fn late_registration_is_cancelled_synchronously() {
        let token = CancellationToken::new();
        token.cancel();

        let flag = Flag::new();
        let member: Arc<dyn Cancellable> = Arc::clone(&flag) as Arc<dyn Cancellable>;
        token.add(&member);
        assert_eq!(flag.count(), 1);
    }

    #[test]
    fn dropped_members_are_skipped() {
        let token = CancellationToken::new();
        let flag = Flag::new();
        {
            let member: Arc<dyn Cancellable> = Flag::new();
            token.add(&member);
            // member dropped here
        }
        let kept: Arc<dyn Cancellable> = Arc::clone(&flag) as Arc<dyn Cancellable>;
        token.add(&kept);

        token.cancel();
        assert_eq!(flag.count(), 1);
    }

    #[test]
    fn reregistration_during_cancel_settles() {
        let token = CancellationToken::new();
        let flag = Flag::new();
        let member: Arc<dyn Cancellable> = Arc::clone(&flag) as Arc<dyn Cancellable>;
        token.add(&member);
        token.cancel();

        // Adding again after the fire must cancel again, synchronously.
        token.add(&member);
        assert_eq!(flag.count(), 2);
    }
}
