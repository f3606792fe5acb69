//! Collection combinators: fan out, fan in.
//!
//! The combinators here take a finite collection and an executor and
//! produce one aggregate future:
//!
//! - [`joined`]: all input futures, results in input order.
//! - [`reduce`]: fold completions into an accumulator, ordered or in
//!   arrival order.
//! - [`async_map`]: one transform task per item, results in input order.
//! - [`async_flat_map`]: one future-producing task per item.
//!
//! # Failure semantics
//!
//! The first observed failure becomes the aggregate's failure; everything
//! else is abandoned. Abandonment is structural: completing the aggregate
//! releases its anchored upstream registrations, and the shared
//! `can_continue` flag stops tasks that have not started their work yet.
//! Draining the aggregate (every consumer dropped) flips the same flag, so
//! work nobody can observe is elided.
//!
//! # Contextual variants
//!
//! Each combinator has a `*_with_context` form that captures an
//! [`ExecutionContext`](crate::context::ExecutionContext) weakly, fails
//! the aggregate with `ContextDeallocated` when the context is gone at
//! dispatch time, and registers the aggregate as a dependent so context
//! teardown cancels still-pending aggregates.

mod join;
mod map;
mod reduce;

pub use join::{joined, joined_with_context};
pub use map::{async_flat_map, async_flat_map_with_context, async_map, async_map_with_context};
pub use reduce::{reduce, reduce_with_context};

/// Index-addressed result buffer shared by the fan-out combinators.
///
/// Guarded by a short [`Lock`](crate::sync::Lock); every mutation is a
/// handful of stores. `unfilled` decrements exactly once per index — a
/// double fill trips a debug assertion, and an unfilled slot surviving to
/// completion is a programming error that fails fast.
pub(crate) struct SliceState<T> {
    slots: Vec<Option<T>>,
    unfilled: usize,
    can_continue: bool,
}

impl<T> SliceState<T> {
    pub(crate) fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self {
            slots,
            unfilled: len,
            can_continue: true,
        }
    }

    pub(crate) const fn can_continue(&self) -> bool {
        self.can_continue
    }

    /// Marks the aggregate as no longer consuming arrivals.
    ///
    /// Returns true for the first call only; the caller that wins gets to
    /// complete the aggregate.
    pub(crate) fn abort(&mut self) -> bool {
        std::mem::replace(&mut self.can_continue, false)
    }

    /// Writes `value` at `index`. Returns the full result vector when
    /// this fill was the last one outstanding.
    pub(crate) fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if !self.can_continue {
            return None;
        }
        let slot = &mut self.slots[index];
        debug_assert!(slot.is_none(), "result slot {index} filled twice");
        if slot.is_some() {
            return None;
        }
        *slot = Some(value);
        self.unfilled -= 1;
        if self.unfilled > 0 {
            return None;
        }
        self.can_continue = false;
        Some(
            self.slots
                .iter_mut()
                .map(|slot| slot.take().expect("result slot unfilled at completion"))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_completes_only_when_all_indices_land() {
        let mut state = SliceState::new(3);
        assert!(state.fill(1, "b").is_none());
        assert!(state.fill(0, "a").is_none());
        let values = state.fill(2, "c").expect("expected completion");
        assert_eq!(values, vec!["a", "b", "c"]);
        assert!(!state.can_continue());
    }

    #[test]
    fn abort_wins_once() {
        let mut state: SliceState<i32> = SliceState::new(2);
        assert!(state.abort());
        assert!(!state.abort());
        assert!(state.fill(0, 1).is_none());
    }
}
