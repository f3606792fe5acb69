//! One-shot futures and promises.
//!
//! A [`Future`] is the read handle to a value that will appear at most
//! once; a [`Promise`] is the write handle to the same underlying state.
//! The state machine is two-step and terminal: `Pending` then
//! `Completed(Fallible<T>)`. The transition is atomic; no intermediate
//! state is observable, and only the first completion has an effect.
//!
//! # Handlers
//!
//! Consumers register callbacks with [`Future::make_final_handler`]. The
//! registration returns a [`FutureHandler`] receipt; holding the receipt
//! keeps the callback registered and dropping it deregisters. The future
//! itself holds handlers weakly, so an abandoned receipt is silently
//! skipped when completion drains the registry. Receipts are typically
//! anchored in a [`ReleasePool`](crate::release_pool::ReleasePool) or an
//! [`ExecutionContext`](crate::context::ExecutionContext).
//!
//! Registration is race-free with completion: a handler registered
//! concurrently with `complete` either observes the completed state (the
//! callback is scheduled synchronously and no receipt is returned) or is
//! included in the in-flight drain. Each handler fires exactly once, on
//! its own executor, and never for a pending future.
//!
//! # Lifetime and drain
//!
//! When the last handle to a pending future drops, its drain callbacks
//! run. Combinators use [`Promise::notify_drain`] to stop producing work
//! once every consumer has vanished.

pub mod factory;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use crate::cancel::Cancellable;
use crate::context::{Completable, ExecutionContext};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fallible::Fallible;
use crate::sync::Lock;
use crate::tracing_compat::trace;

type Callback<T> = Box<dyn FnOnce(Fallible<T>) + Send>;
type DrainFn = Box<dyn FnOnce() + Send>;

enum State<T> {
    Pending,
    Completed(Fallible<T>),
}

struct Registry<T> {
    state: State<T>,
    /// Registered handlers, held weakly; receipts own the cores.
    handlers: Vec<Weak<HandlerCore<T>>>,
    /// Receipts and other objects this future keeps alive until it
    /// completes (upstream registrations made on its behalf).
    anchors: Vec<Box<dyn Any + Send>>,
    /// Run if the state is dropped while still pending.
    drain_callbacks: Vec<DrainFn>,
}

/// The state shared by a future, its promise, and their clones.
pub(crate) struct Shared<T> {
    registry: Mutex<Registry<T>>,
    completed_signal: Condvar,
}

struct HandlerCore<T> {
    executor: Executor,
    callback: Lock<Option<Callback<T>>>,
}

/// Receipt for a registered handler.
///
/// Holding it keeps the callback registered; dropping it deregisters.
/// The receipt is deliberately type-erased so release pools can anchor
/// receipts for futures of different value types side by side.
pub struct FutureHandler {
    _core: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for FutureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FutureHandler")
    }
}

impl<T> Shared<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry {
                state: State::Pending,
                handlers: Vec::new(),
                anchors: Vec::new(),
                drain_callbacks: Vec::new(),
            }),
            completed_signal: Condvar::new(),
        })
    }

    /// Fast path for futures that are complete at construction: no
    /// handler registry activity, no notification.
    fn new_completed(value: Fallible<T>) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry {
                state: State::Completed(value),
                handlers: Vec::new(),
                anchors: Vec::new(),
                drain_callbacks: Vec::new(),
            }),
            completed_signal: Condvar::new(),
        })
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_completed(&self) -> bool {
        matches!(self.lock_registry().state, State::Completed(_))
    }

    /// Keeps `anchor` alive until this future completes.
    ///
    /// Dropped immediately if the future has already completed.
    fn retain_anchor(&self, anchor: Box<dyn Any + Send>) {
        let mut registry = self.lock_registry();
        if matches!(registry.state, State::Pending) {
            registry.anchors.push(anchor);
        } else {
            drop(registry);
            drop(anchor);
        }
    }
}

impl<T: Clone + Send + 'static> Shared<T> {
    /// Transitions `Pending → Completed`. Only the first call has an
    /// effect; the return value says whether this call was it.
    fn complete(&self, value: Fallible<T>) -> bool {
        let (handlers, anchors, drains) = {
            let mut registry = self.lock_registry();
            if matches!(registry.state, State::Completed(_)) {
                return false;
            }
            registry.state = State::Completed(value.clone());
            (
                std::mem::take(&mut registry.handlers),
                std::mem::take(&mut registry.anchors),
                std::mem::take(&mut registry.drain_callbacks),
            )
        };
        self.completed_signal.notify_all();

        let mut delivered = 0_usize;
        for weak in handlers {
            if let Some(core) = weak.upgrade() {
                if let Some(callback) = core.callback.lock().take() {
                    let value = value.clone();
                    core.executor.execute(move || callback(value));
                    delivered += 1;
                }
            }
        }
        trace!(delivered, success = value.is_success(), "future completed");

        // Upstream registrations and never-to-fire drain callbacks are
        // released outside the lock.
        drop(anchors);
        drop(drains);
        true
    }

    fn wait(&self) -> Fallible<T> {
        let mut registry = self.lock_registry();
        loop {
            if let State::Completed(value) = &registry.state {
                return value.clone();
            }
            registry = self
                .completed_signal
                .wait(registry)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(registry.state, State::Pending) {
            let drains = std::mem::take(&mut registry.drain_callbacks);
            trace!(callbacks = drains.len(), "pending future drained");
            for callback in drains {
                callback();
            }
        }
    }
}

impl<T: Clone + Send + 'static> Cancellable for Shared<T> {
    fn cancel(&self) {
        self.complete(Fallible::Failure(Error::cancelled()));
    }
}

impl<T: Clone + Send + 'static> Completable for Shared<T> {
    fn fail_with_deallocated_context(&self) {
        self.complete(Fallible::Failure(Error::context_deallocated()));
    }

    fn is_complete(&self) -> bool {
        self.is_completed()
    }
}

/// Read handle to a value that will appear at most once.
pub struct Future<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

/// Write handle to a [`Future`]'s underlying state.
pub struct Promise<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

/// A weak write handle, used by producers that must not keep an
/// abandoned future alive.
pub struct WeakPromise<T> {
    shared: Weak<Shared<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Clone for WeakPromise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.lock_registry();
        let state = match &registry.state {
            State::Pending => "pending",
            State::Completed(value) if value.is_success() => "succeeded",
            State::Completed(_) => "failed",
        };
        f.debug_struct("Future")
            .field("state", &state)
            .field("handlers", &registry.handlers.len())
            .finish()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("completed", &self.shared.is_completed())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates a pending promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Shared::new(),
        }
    }

    /// Returns a read handle to this promise's state.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        Future {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns a weak write handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakPromise<T> {
        WeakPromise {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Completes with a success value. Returns false if already complete.
    pub fn succeed(&self, value: T) -> bool {
        self.shared.complete(Fallible::Success(value))
    }

    /// Completes with a failure. Returns false if already complete.
    pub fn fail(&self, error: Error) -> bool {
        self.shared.complete(Fallible::Failure(error))
    }

    /// Completes with an already-built [`Fallible`].
    pub fn complete(&self, value: Fallible<T>) -> bool {
        self.shared.complete(value)
    }

    /// Forwards the completion of `other` into this promise.
    ///
    /// Race-safe when `other` is already complete.
    pub fn complete_with(&self, other: &Future<T>) {
        let weak = self.downgrade();
        let receipt = other.make_final_handler(&Executor::immediate(), move |value| {
            if let Some(shared) = weak.shared.upgrade() {
                shared.complete(value);
            }
        });
        if let Some(receipt) = receipt {
            self.shared.retain_anchor(Box::new(receipt));
        }
    }

    /// Fails with `Cancelled`.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Fails with `ContextDeallocated`.
    pub fn cancel_because_of_deallocated_context(&self) {
        self.shared.fail_with_deallocated_context();
    }

    /// Registers a callback to run if this promise's state is released
    /// without ever completing.
    ///
    /// Combinators use this to stop enqueuing work when every consumer
    /// has vanished. A callback registered after completion never runs.
    pub fn notify_drain(&self, callback: impl FnOnce() + Send + 'static) {
        let mut registry = self.shared.lock_registry();
        if matches!(registry.state, State::Pending) {
            registry.drain_callbacks.push(Box::new(callback));
        }
    }

    /// Returns true once completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.shared.is_completed()
    }

    /// This promise as a token-cancellable object.
    #[must_use]
    pub fn cancellable(&self) -> Arc<dyn Cancellable> {
        Arc::clone(&self.shared) as Arc<dyn Cancellable>
    }

    pub(crate) fn retain_anchor(&self, anchor: Box<dyn Any + Send>) {
        self.shared.retain_anchor(anchor);
    }
}

impl<T: Clone + Send + 'static> WeakPromise<T> {
    /// Upgrades to a strong write handle if any consumer still holds the
    /// future.
    #[must_use]
    pub fn upgrade(&self) -> Option<Promise<T>> {
        self.shared.upgrade().map(|shared| Promise { shared })
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Registers `callback` to receive the completion value on `executor`.
    ///
    /// If the future is already complete the callback is scheduled
    /// immediately and no receipt is returned. Otherwise the returned
    /// [`FutureHandler`] keeps the registration alive; dropping it
    /// deregisters.
    pub fn make_final_handler<F>(&self, executor: &Executor, callback: F) -> Option<FutureHandler>
    where
        F: FnOnce(Fallible<T>) + Send + 'static,
    {
        let mut registry = self.shared.lock_registry();
        match &registry.state {
            State::Completed(value) => {
                let value = value.clone();
                drop(registry);
                executor.execute(move || callback(value));
                None
            }
            State::Pending => {
                let core = Arc::new(HandlerCore {
                    executor: executor.clone(),
                    callback: Lock::new(Some(Box::new(callback))),
                });
                registry.handlers.retain(|weak| weak.strong_count() > 0);
                registry.handlers.push(Arc::downgrade(&core));
                drop(registry);
                Some(FutureHandler { _core: core })
            }
        }
    }

    /// Blocks the calling thread until completion.
    ///
    /// For tests and synchronous bridges; production consumers register
    /// handlers instead.
    #[must_use]
    pub fn wait(&self) -> Fallible<T> {
        self.shared.wait()
    }

    /// Returns true once completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.shared.is_completed()
    }

    /// Fails with `Cancelled` (first completion wins).
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// True when two handles read the same underlying future.
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    /// This future as a token-cancellable object.
    #[must_use]
    pub fn cancellable(&self) -> Arc<dyn Cancellable> {
        Arc::clone(&self.shared) as Arc<dyn Cancellable>
    }

    pub(crate) fn completable(&self) -> Arc<dyn Completable> {
        Arc::clone(&self.shared) as Arc<dyn Completable>
    }

    pub(crate) fn retain_anchor(&self, anchor: Box<dyn Any + Send>) {
        self.shared.retain_anchor(anchor);
    }

    /// Completes a downstream future with `transform` applied to this
    /// future's success value; failures propagate unchanged.
    ///
    /// The transform runs on `executor`. A transform that returns `Err`
    /// or panics fails the downstream future.
    pub fn map<U, F>(&self, executor: &Executor, transform: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let promise = Promise::new();
        let weak = promise.downgrade();
        let receipt = self.make_final_handler(executor, move |value: Fallible<T>| {
            let Some(downstream) = weak.upgrade() else {
                return;
            };
            match value {
                Fallible::Success(value) => {
                    downstream.complete(Fallible::from_thunk(|| transform(value)));
                }
                Fallible::Failure(err) => {
                    downstream.fail(err);
                }
            }
        });
        if let Some(receipt) = receipt {
            promise.shared.retain_anchor(Box::new(receipt));
        }
        promise.future()
    }

    /// Like [`Future::map`], with a transform that produces another
    /// future; the downstream future completes with the inner one.
    pub fn flat_map<U, F>(&self, executor: &Executor, transform: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Future<U>> + Send + 'static,
    {
        let promise = Promise::new();
        let weak = promise.downgrade();
        let receipt = self.make_final_handler(executor, move |value: Fallible<T>| {
            let Some(downstream) = weak.upgrade() else {
                return;
            };
            match value {
                Fallible::Success(value) => match Fallible::from_thunk(|| transform(value)) {
                    Fallible::Success(inner) => downstream.complete_with(&inner),
                    Fallible::Failure(err) => {
                        downstream.fail(err);
                    }
                },
                Fallible::Failure(err) => {
                    downstream.fail(err);
                }
            }
        });
        if let Some(receipt) = receipt {
            promise.shared.retain_anchor(Box::new(receipt));
        }
        promise.future()
    }

    /// Contextual [`Future::map`]: the transform receives the context,
    /// which is captured weakly. If the context is gone when this future
    /// completes, the downstream future fails with `ContextDeallocated`
    /// and the transform never runs. The downstream future is registered
    /// as a dependent of the context.
    pub fn map_with_context<U, F>(
        &self,
        context: &ExecutionContext,
        executor: &Executor,
        transform: F,
    ) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&ExecutionContext, T) -> Result<U> + Send + 'static,
    {
        let promise = Promise::new();
        context.add_dependent(&promise.future());
        let weak_context = context.downgrade();
        let weak = promise.downgrade();
        let receipt = self.make_final_handler(executor, move |value: Fallible<T>| {
            let Some(downstream) = weak.upgrade() else {
                return;
            };
            let Some(context) = weak_context.upgrade() else {
                downstream.cancel_because_of_deallocated_context();
                return;
            };
            match value {
                Fallible::Success(value) => {
                    downstream.complete(Fallible::from_thunk(|| transform(&context, value)));
                }
                Fallible::Failure(err) => {
                    downstream.fail(err);
                }
            }
        });
        if let Some(receipt) = receipt {
            promise.shared.retain_anchor(Box::new(receipt));
        }
        promise.future()
    }

    /// Contextual [`Future::flat_map`]; see [`Future::map_with_context`]
    /// for the context-liveness contract.
    pub fn flat_map_with_context<U, F>(
        &self,
        context: &ExecutionContext,
        executor: &Executor,
        transform: F,
    ) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&ExecutionContext, T) -> Result<Future<U>> + Send + 'static,
    {
        let promise = Promise::new();
        context.add_dependent(&promise.future());
        let weak_context = context.downgrade();
        let weak = promise.downgrade();
        let receipt = self.make_final_handler(executor, move |value: Fallible<T>| {
            let Some(downstream) = weak.upgrade() else {
                return;
            };
            let Some(context) = weak_context.upgrade() else {
                downstream.cancel_because_of_deallocated_context();
                return;
            };
            match value {
                Fallible::Success(value) => {
                    match Fallible::from_thunk(|| transform(&context, value)) {
                        Fallible::Success(inner) => downstream.complete_with(&inner),
                        Fallible::Failure(err) => {
                            downstream.fail(err);
                        }
                    }
                }
                Fallible::Failure(err) => {
                    downstream.fail(err);
                }
            }
        });
        if let Some(receipt) = receipt {
            promise.shared.retain_anchor(Box::new(receipt));
        }
        promise.future()
    }
}
