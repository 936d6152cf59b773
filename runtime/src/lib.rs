//! # Tirtha Runtime
//!
//! The `Store` runtime that coordinates reducer execution and effect handling.
//!
//! A Store owns one aggregate's state, serializes all mutation through its
//! reducer behind a write lock, executes the effect descriptions the reducer
//! returns, and feeds effect-produced actions back into the reducer.
//!
//! Every processed action is also published on a broadcast channel, which is
//! how interested parties (ticket views, admin dashboards) observe state
//! changes in near-real-time without polling - subscribe, filter, drop the
//! receiver to unsubscribe.
//!
//! There is deliberately **no retry machinery** here: a failed effect is
//! logged and counted, and the triggering user re-drives the action. Writes
//! are never replayed behind the user's back.
//!
//! ## Example
//!
//! ```ignore
//! use tirtha_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action and wait for its effects to finish
//! store.send(Action::DoSomething).await.wait().await;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//!
//! // Observe actions as they are processed
//! let mut events = store.subscribe();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tirtha_core::effect::Effect;
use tirtha_core::reducer::Reducer;
use tokio::sync::{RwLock, broadcast, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for effects to complete
        #[error("Timeout waiting for effects")]
        Timeout,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send`] so callers can wait until the effects spawned
/// by an action (including feedback actions' effects) have finished.
///
/// # Example
///
/// ```ignore
/// let handle = store.send(Action::Start).await;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    pending: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let pending = Arc::new(AtomicUsize::new(0));
        let (notifier, completion) = watch::channel(());

        let handle = Self {
            pending: Arc::clone(&pending),
            completion,
        };
        let tracking = EffectTracking { pending, notifier: Arc::new(notifier) };

        (handle, tracking)
    }

    /// Create a handle that is already complete
    ///
    /// Useful as the initial value when accumulating handles in a loop.
    #[must_use]
    pub fn completed() -> Self {
        let (notifier, completion) = watch::channel(());
        let _ = notifier.send(());

        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            completion,
        }
    }

    /// Wait for all tracked effects to complete
    pub async fn wait(&mut self) {
        while self.pending.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all tracked effects to complete, up to `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when the
    /// timeout expires.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect tracking context passed through effect execution
struct EffectTracking {
    pending: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

impl Clone for EffectTracking {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Ensures the counter is decremented even if an effect task panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

struct Inner<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: RwLock<S>,
    reducer: R,
    environment: E,
    shutdown: AtomicBool,
    pending_effects: AtomicUsize,
    action_broadcast: broadcast::Sender<A>,
}

/// The Store - runtime coordinator for a reducer
///
/// The Store manages:
/// 1. State (behind `RwLock` for concurrent access)
/// 2. Reducer (business logic)
/// 3. Environment (injected dependencies)
/// 4. Effect execution (with action feedback loop)
/// 5. Action broadcast (push notifications to observers)
///
/// Cloning a Store is cheap; clones share state and observers.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    inner: Arc<Inner<S, A, E, R>>,
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Send + Clone + std::fmt::Debug + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment
    ///
    /// The action broadcast channel defaults to a capacity of 64; use
    /// [`Store::with_broadcast_capacity`] when many slow observers are
    /// expected.
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
    }

    /// Create a new store with a custom action broadcast capacity
    #[must_use]
    pub fn with_broadcast_capacity(
        initial_state: S,
        reducer: R,
        environment: E,
        capacity: usize,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(capacity);

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(initial_state),
                reducer,
                environment,
                shutdown: AtomicBool::new(false),
                pending_effects: AtomicUsize::new(0),
                action_broadcast,
            }),
        }
    }

    /// Send an action through the reducer and start executing its effects
    ///
    /// Returns an [`EffectHandle`] that completes when every effect spawned
    /// by this action (transitively, through feedback actions) has finished.
    ///
    /// Actions sent after [`Store::shutdown`] has been initiated are dropped
    /// with a warning.
    pub async fn send(&self, action: A) -> EffectHandle {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            metrics::counter!("store.actions_dropped").increment(1);
            tracing::warn!(?action, "store is shutting down, dropping action");
            return EffectHandle::completed();
        }

        let (handle, tracking) = EffectHandle::new();
        self.process(action, &tracking).await;
        handle
    }

    /// Read state through a projection function
    ///
    /// Takes a read lock for the duration of `f`; keep projections cheap.
    pub async fn state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        let state = self.inner.state.read().await;
        f(&state)
    }

    /// Subscribe to the action broadcast
    ///
    /// Every action processed by this store (sent or fed back from effects)
    /// is delivered to all active receivers. Dropping the receiver is the
    /// unsubscribe; a receiver that falls behind sees a `Lagged` error and
    /// can resubscribe.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<A> {
        self.inner.action_broadcast.subscribe()
    }

    /// Number of effects currently in flight
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.inner.pending_effects.load(Ordering::SeqCst)
    }

    /// Initiate graceful shutdown
    ///
    /// Rejects new actions and waits up to `timeout` for in-flight effects
    /// to drain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
    /// still running if the timeout elapses first.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.inner.shutdown.store(true, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pending = self.inner.pending_effects.load(Ordering::SeqCst);
            if pending == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(StoreError::ShutdownTimeout(pending));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Run one action through the reducer and spawn its effects
    async fn process(&self, action: A, tracking: &EffectTracking) {
        metrics::counter!("store.actions_processed").increment(1);

        let effects = {
            let mut state = self.inner.state.write().await;
            self.inner
                .reducer
                .reduce(&mut state, action.clone(), &self.inner.environment)
        };

        // Broadcast after the reducer has applied the action, so observers
        // reading state see the post-action view.
        if self.inner.action_broadcast.receiver_count() > 0 {
            let _ = self.inner.action_broadcast.send(action);
        }

        for effect in effects {
            self.spawn_effect(effect, tracking);
        }
    }

    /// Spawn one effect onto the runtime
    fn spawn_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
        if effect.is_none() {
            return;
        }

        tracking.increment();
        self.inner.pending_effects.fetch_add(1, Ordering::SeqCst);

        let store = self.clone();
        let tracking = tracking.clone();
        tokio::spawn(async move {
            let _guard = DecrementGuard(tracking.clone());
            store.run_effect(effect, &tracking).await;
            store.inner.pending_effects.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Execute one effect to completion, feeding resulting actions back
    fn run_effect<'a>(
        &'a self,
        effect: Effect<A>,
        tracking: &'a EffectTracking,
    ) -> futures::future::BoxFuture<'a, ()> {
        Box::pin(async move {
            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    for inner in effects {
                        self.spawn_effect(inner, tracking);
                    }
                },
                Effect::Sequential(effects) => {
                    for inner in effects {
                        self.run_effect(inner, tracking).await;
                    }
                },
                Effect::Delay { duration, action } => {
                    tokio::time::sleep(duration).await;
                    self.process(*action, tracking).await;
                },
                Effect::Future(future) => {
                    if let Some(action) = future.await {
                        self.process(action, tracking).await;
                    }
                },
            }
        })
    }
}
