//! Serial dispatch over an arbitrary parent executor.
//!
//! [`SerialQueue`] realizes the classic serial-dispatcher pattern: an
//! injector FIFO plus an atomic "draining" flag. Submissions are totally
//! ordered with respect to each other and never run concurrently, while the
//! actual execution borrows whichever thread the parent executor provides.
//! No dedicated thread, no lock held while running blocks.
//!
//! The drain loop is non-reentrant by construction: a block submitted from
//! inside a draining block lands in the FIFO and runs after the current
//! block returns, on the same drain pass.

use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::pool::Job;
use super::Executor;

/// State shared between a serial executor handle and its drain passes.
pub(super) struct SerialQueue {
    /// The parent executor drain passes are submitted to.
    parent: Executor,
    /// Queued blocks in submission order.
    queue: SegQueue<Job>,
    /// Whether a drain pass is scheduled or running.
    draining: AtomicBool,
}

impl SerialQueue {
    pub(super) fn new(parent: Executor) -> Self {
        Self {
            parent,
            queue: SegQueue::new(),
            draining: AtomicBool::new(false),
        }
    }

    /// Enqueues a block and schedules a drain pass if none is active.
    pub(super) fn submit(self: &Arc<Self>, job: Job) {
        self.queue.push(job);
        self.schedule_drain();
    }

    fn schedule_drain(self: &Arc<Self>) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let state = Arc::clone(self);
            self.parent.execute(move || state.drain());
        }
    }

    /// Runs queued blocks until the FIFO is observed empty.
    ///
    /// The flag handshake at the bottom closes the race where a submitter
    /// enqueues between our last pop and the flag reset: after clearing the
    /// flag we re-check the queue and re-claim if anything is waiting.
    fn drain(self: &Arc<Self>) {
        loop {
            while let Some(job) = self.queue.pop() {
                // A panicking block must not wedge the queue with the
                // draining flag stuck set.
                if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
                    let _ = payload;
                    crate::tracing_compat::warn!("serial block panicked; queue continues");
                }
            }
            self.draining.store(false, Ordering::Release);
            if self.queue.is_empty()
                || self
                    .draining
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                return;
            }
        }
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("queued", &self.queue.len())
            .field("draining", &self.draining.load(Ordering::Relaxed))
            .finish()
    }
}
