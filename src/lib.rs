//! pactum: composable one-shot futures, executors, and lifetime-scoped
//! cancellation for callback-style concurrency.
//!
//! # Overview
//!
//! pactum is built on the principle that callback graphs are only safe to
//! compose when lifetimes are structural. Every handler registration is a
//! receipt with an anchor; every dependent computation is owned by an
//! execution context that fails it on teardown; every cancellation is a
//! completed value, never a silent drop.
//!
//! # Core Guarantees
//!
//! - **At-most-once values**: a [`Future`] completes once; repeat
//!   completions are no-ops, and every handler fires exactly once
//! - **No resurrection**: handlers hold futures and contexts weakly; a
//!   collaborator that is gone stays gone
//! - **Cancellation is a value**: a fired token or a dead context
//!   completes futures with `Cancelled` / `ContextDeallocated`; nothing
//!   unwinds across an executor boundary
//! - **Single-flight caching**: a [`CachedValue`] never has two
//!   concurrent recomputations between invalidations
//! - **First failure wins**: collection combinators short-circuit and
//!   release abandoned registrations structurally
//!
//! # Module Structure
//!
//! - [`fallible`]: the tagged success-or-failure value
//! - [`error`]: error taxonomy (`Cancelled`, `ContextDeallocated`, user
//!   errors)
//! - [`executor`]: immediate, pooled, serial executors and presets
//! - [`future`]: one-shot futures, promises, handler receipts, factories
//! - [`cancel`]: fan-out cancellation tokens
//! - [`release_pool`]: scoped anchors for handler receipts
//! - [`context`]: execution contexts binding work to collaborator
//!   lifetimes
//! - [`cached`]: single-flight recomputable value
//! - [`combinator`]: `joined`, `reduce`, `async_map`, `async_flat_map`
//! - [`time`]: delay futures and deadline tokens
//! - [`config`]: worker pool sizing
//! - [`sync`]: the short critical-section lock
//!
//! # Example
//!
//! ```
//! use pactum::{combinator, Executor};
//!
//! let doubled = combinator::async_map(&Executor::primary(), vec![1, 2, 3], |n| Ok(n * 2));
//! let total = doubled.map(&Executor::primary(), |values: Vec<i32>| {
//!     Ok(values.into_iter().sum::<i32>())
//! });
//! assert_eq!(total.wait().lift_success().unwrap(), 12);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cached;
pub mod cancel;
pub mod combinator;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod fallible;
pub mod future;
pub mod release_pool;
pub mod sync;
pub mod test_utils;
pub mod time;
pub mod tracing_compat;

// Re-exports for convenient access to core types
pub use cached::CachedValue;
pub use cancel::{Cancellable, CancellationToken};
pub use combinator::{
    async_flat_map, async_flat_map_with_context, async_map, async_map_with_context, joined,
    joined_with_context, reduce, reduce_with_context,
};
pub use config::{ConfigError, PoolConfig};
pub use context::{ExecutionContext, WeakExecutionContext};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use executor::{Executor, QosClass};
pub use fallible::Fallible;
pub use future::{Future, FutureHandler, Promise, WeakPromise};
pub use release_pool::ReleasePool;
