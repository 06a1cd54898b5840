//! The Store: serialized dispatch and effect scheduling.
//!
//! Every action, whether sent by a caller or emitted by a running effect,
//! enters through one run queue. Whoever finds the queue idle becomes the
//! drainer and reduces queued actions one at a time until it is empty;
//! everyone else appends and waits for their turn. That gives a single total
//! order over all actions without holding a lock across reductions.
//!
//! Reducing an action happens under the State lock. The returned effect is
//! scheduled right after the lock is released:
//!
//! - `Send` chains are re-entered immediately, depth first, before the next
//!   queued action
//! - `Cancel` and cancel-in-flight are applied synchronously
//! - anything that suspends is spawned on a tokio task and feeds its
//!   actions back through the run queue as they are produced

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::executor::{ExecContext, cancelled_or_pending, execute, is_synchronous, kind};
use crate::handle::{EffectHandle, EffectTracking};
use crate::metrics::{EffectMetrics, StoreMetrics};
use crate::registry::{CancellationRegistry, Registration};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, watch};
use unistore_core::{ActionSink, CancelSignal, Effect, EffectId, Emitter, Reducer};

/// Destination for actions produced by effects
///
/// - `Auto`: send back into the Store's run queue (production)
/// - `Queued`: hand to a sink for manual processing (testing)
pub enum FeedbackDestination<A> {
    /// Auto-feedback to the store (production mode)
    Auto,

    /// Divert to a sink instead of dispatching (test mode)
    ///
    /// Synchronous `Send` chains are diverted too, so every effect-produced
    /// action passes through the sink.
    Queued(Arc<dyn ActionSink<A>>),
}

impl<A> Clone for FeedbackDestination<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Auto => Self::Auto,
            Self::Queued(sink) => Self::Queued(Arc::clone(sink)),
        }
    }
}

impl<A> std::fmt::Debug for FeedbackDestination<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Queued(_) => write!(f, "Queued(<sink>)"),
        }
    }
}

struct Queued<A> {
    action: A,
    ack: Option<oneshot::Sender<EffectHandle>>,
}

struct RunQueue<A> {
    queue: VecDeque<Queued<A>>,
    draining: bool,
}

/// Releases the run queue if a reducer panics mid-drain.
///
/// Clears the drainer flag so later sends can make progress, and drops
/// every queued action: their acks close, so waiting callers get
/// [`StoreError::ChannelClosed`] instead of hanging until the next send.
struct ResetOnUnwind<'a, A>(&'a Mutex<RunQueue<A>>);

impl<A> Drop for ResetOnUnwind<'_, A> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let abandoned = {
                let mut run_queue = self.0.lock().unwrap_or_else(PoisonError::into_inner);
                run_queue.draining = false;
                std::mem::take(&mut run_queue.queue)
            };
            if !abandoned.is_empty() {
                tracing::error!(
                    abandoned = abandoned.len(),
                    "Reducer panicked, dropping queued actions"
                );
            }
        }
    }
}

/// A suspending effect waiting to be spawned, with its cancellable scope
/// already registered
struct Deferred<A> {
    effect: Effect<A>,
    registration: Option<Registration>,
}

impl<A> Deferred<A> {
    const fn new(effect: Effect<A>, registration: Option<Registration>) -> Self {
        Self {
            effect,
            registration,
        }
    }
}

/// Counts one running effect task in the store-wide in-flight total
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl InFlightGuard {
    fn new(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        EffectMetrics::record_task_started();
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
        EffectMetrics::record_task_finished();
    }
}

struct Shared<S, A, E, R> {
    state: Mutex<S>,
    reducer: R,
    environment: E,
    config: StoreConfig,
    feedback: FeedbackDestination<A>,
    run_queue: Mutex<RunQueue<A>>,
    registry: CancellationRegistry,
    /// Signal bound to every task spawned since the last `cancel_all`
    teardown: Mutex<CancelSignal>,
    shutdown: AtomicBool,
    in_flight: Arc<watch::Sender<usize>>,
    /// Action broadcast channel for observing actions produced by effects.
    action_broadcast: broadcast::Sender<A>,
}

/// Routes emissions from running effects back into the Store that spawned
/// them. Holds the Store weakly so a dropped Store is not kept alive by its
/// own effects.
struct DispatchSink<S, A, E, R> {
    shared: Weak<Shared<S, A, E, R>>,
}

impl<S, A, E, R> ActionSink<A> for DispatchSink<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Send + 'static,
    A: Send + Clone + 'static,
    E: Send + Sync + 'static,
{
    fn deliver(&self, action: A) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.feed_back(action),
            None => {
                tracing::debug!("Dropping effect action: store no longer exists");
                false
            },
        }
    }
}

impl<S, A, E, R> Shared<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Send + 'static,
    A: Send + Clone + 'static,
    E: Send + Sync + 'static,
{
    fn lock_state(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, RunQueue<A>> {
        self.run_queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn teardown_signal(&self) -> CancelSignal {
        self.teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn broadcast(&self, action: &A) {
        if self.action_broadcast.receiver_count() > 0 {
            // Only fails when every receiver is gone
            let _ = self.action_broadcast.send(action.clone());
        }
    }

    /// Entry point for actions produced by running effects
    fn feed_back(self: &Arc<Self>, action: A) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::debug!("Dropping effect action: store is shutting down");
            return false;
        }

        self.broadcast(&action);
        match &self.feedback {
            FeedbackDestination::Auto => {
                self.enqueue(action, None);
                true
            },
            FeedbackDestination::Queued(sink) => sink.deliver(action),
        }
    }

    /// Append to the run queue, draining it if nobody else is.
    fn enqueue(self: &Arc<Self>, action: A, ack: Option<oneshot::Sender<EffectHandle>>) {
        {
            let mut run_queue = self.lock_queue();
            run_queue.queue.push_back(Queued { action, ack });
            if run_queue.draining {
                tracing::trace!(queued = run_queue.queue.len(), "Dispatch in progress, action queued");
                return;
            }
            run_queue.draining = true;
        }
        self.drain();
    }

    fn drain(self: &Arc<Self>) {
        let _reset = ResetOnUnwind(&self.run_queue);
        loop {
            let next = {
                let mut run_queue = self.lock_queue();
                match run_queue.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        run_queue.draining = false;
                        return;
                    },
                }
            };

            let handle = self.process(next.action);
            if let Some(ack) = next.ack {
                // The caller may have given up waiting
                let _ = ack.send(handle);
            }
        }
    }

    /// Reduce one action plus its synchronous `Send` chain.
    fn process(self: &Arc<Self>, action: A) -> EffectHandle {
        let (handle, tracking) = EffectHandle::new();
        let mut chain = VecDeque::from([action]);

        while let Some(action) = chain.pop_front() {
            let effect = self.reduce(action);

            let mut immediate = Vec::new();
            let mut deferred = Vec::new();
            self.schedule(effect, &mut immediate, &mut deferred);

            for action in &immediate {
                self.broadcast(action);
            }
            match &self.feedback {
                FeedbackDestination::Auto => {
                    for action in immediate.into_iter().rev() {
                        chain.push_front(action);
                    }
                },
                FeedbackDestination::Queued(sink) => {
                    for action in immediate {
                        if !sink.deliver(action) {
                            tracing::debug!("Feedback sink rejected a sent action");
                        }
                    }
                },
            }

            // Tasks start only after the synchronous prefix is out, so a
            // concatenated tail can never overtake the actions sent before it
            for Deferred {
                effect,
                registration,
            } in deferred
            {
                self.spawn(effect, registration, &tracking);
            }
        }

        handle
    }

    fn reduce(&self, action: A) -> Effect<A> {
        let mut state = self.lock_state();
        tracing::trace!("Acquired state lock");

        let span = tracing::debug_span!("reducer_execution");
        let _enter = span.enter();

        let start = Instant::now();
        let effect = self.reducer.reduce(&mut state, action, &self.environment);
        StoreMetrics::record_action(start.elapsed());

        tracing::trace!(effect = kind(&effect), "Reducer completed");
        effect
    }

    /// Schedule an effect.
    ///
    /// Parts that finish without suspending happen now; actions they send
    /// are collected into `immediate`. Everything else is collected into
    /// `deferred` for the caller to spawn once `immediate` is delivered.
    fn schedule(&self, effect: Effect<A>, immediate: &mut Vec<A>, deferred: &mut Vec<Deferred<A>>) {
        if !effect.is_none() {
            EffectMetrics::record_scheduled(kind(&effect));
        }

        match effect {
            Effect::None => {},
            Effect::Send(action) => immediate.push(action),
            Effect::Cancel(id) => {
                self.registry.cancel(&id);
            },
            Effect::Merge(children) => {
                for child in children {
                    self.schedule(child, immediate, deferred);
                }
            },
            Effect::Concatenate(children) => {
                let mut children = children.into_iter();
                let mut rest = Vec::new();
                // Leading children that finish without suspending run now
                for child in children.by_ref() {
                    if is_synchronous(&child) {
                        self.schedule(child, immediate, deferred);
                    } else {
                        rest.push(child);
                        break;
                    }
                }
                rest.extend(children);
                if !rest.is_empty() {
                    deferred.push(Deferred::new(Effect::Concatenate(rest), None));
                }
            },
            run @ Effect::Run(_) => deferred.push(Deferred::new(run, None)),
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => {
                if cancel_in_flight {
                    self.registry.cancel(&id);
                }
                if is_synchronous(&effect) {
                    self.schedule(*effect, immediate, deferred);
                } else {
                    // Registered now so a later `Cancel` in the same tree sees it
                    let registration = self.registry.register(id);
                    deferred.push(Deferred::new(*effect, Some(registration)));
                }
            },
        }
    }

    fn sink(self: &Arc<Self>) -> Arc<dyn ActionSink<A>> {
        Arc::new(DispatchSink {
            shared: Arc::downgrade(self),
        })
    }

    /// Spawn a task running `effect`, optionally inside a cancellable scope
    /// registered before the task starts.
    fn spawn(
        self: &Arc<Self>,
        effect: Effect<A>,
        registration: Option<Registration>,
        tracking: &EffectTracking,
    ) {
        let teardown = self.teardown_signal();
        let scope = registration.as_ref().map(|r| r.signal().clone());

        let mut emitter = Emitter::new(self.sink()).with_signal(teardown.clone());
        if let Some(scope) = &scope {
            emitter = emitter.with_signal(scope.clone());
        }
        let ctx = ExecContext {
            emitter,
            registry: self.registry.clone(),
        };

        let task = tracking.start();
        let in_flight = InFlightGuard::new(&self.in_flight);

        tokio::spawn(async move {
            // Dropped in reverse order: deregister before uncounting
            let _task = task;
            let _in_flight = in_flight;
            let _registration = registration;

            tokio::select! {
                biased;
                () = teardown.cancelled() => tracing::trace!("Effect torn down"),
                () = cancelled_or_pending(scope) => tracing::trace!("Effect cancelled"),
                () = execute(effect, ctx) => tracing::trace!("Effect completed"),
            }
        });
    }

    fn cancel_all(&self) -> usize {
        let running = *self.in_flight.borrow();
        let previous = std::mem::take(
            &mut *self.teardown.lock().unwrap_or_else(PoisonError::into_inner),
        );
        previous.cancel();
        let registered = self.registry.cancel_all();
        tracing::debug!(running, registered, "Cancelled all in-flight effects");
        running
    }
}

impl<S, A, E, R> Drop for Shared<S, A, E, R> {
    fn drop(&mut self) {
        self.teardown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.registry.cancel_all();
    }
}

/// The Store - runtime coordinator for a reducer
///
/// The Store manages:
/// 1. State (behind a mutex held only while the reducer runs)
/// 2. Reducer (business logic)
/// 3. Environment (injected dependencies)
/// 4. Effect execution (with feedback loop)
///
/// Cloning a Store yields another handle to the same state and run queue.
/// Dropping the last handle tears down every running effect.
///
/// # Type Parameters
///
/// - `S`: State type
/// - `A`: Action type
/// - `E`: Environment type
/// - `R`: Reducer implementation
///
/// # Example
///
/// ```ignore
/// let store = Store::new(
///     SearchState::default(),
///     SearchReducer,
///     production_environment(),
/// );
///
/// store.send(SearchAction::QueryChanged("rust".into())).await?;
/// ```
pub struct Store<S, A, E, R> {
    shared: Arc<Shared<S, A, E, R>>,
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Send + 'static,
    A: Send + Clone + 'static,
    E: Send + Sync + 'static,
{
    /// Create a new store with default configuration
    ///
    /// # Arguments
    ///
    /// - `initial_state`: The starting state
    /// - `reducer`: The reducer implementation
    /// - `environment`: Injected capabilities
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_config(initial_state, reducer, environment, StoreConfig::default())
    }

    /// Create a new store with custom configuration
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = StoreConfig::from_env()?;
    /// let store = Store::with_config(state, reducer, env, config);
    /// ```
    #[must_use]
    pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
        Self::with_feedback(
            initial_state,
            reducer,
            environment,
            config,
            FeedbackDestination::Auto,
        )
    }

    /// Create a store whose effect-produced actions go to `feedback`
    ///
    /// With [`FeedbackDestination::Queued`] the store only reduces actions
    /// passed to [`send`](Self::send); the owner of the sink decides when
    /// (and whether) effect output is dispatched. The test harness is built
    /// on this.
    #[must_use]
    pub fn with_feedback(
        initial_state: S,
        reducer: R,
        environment: E,
        config: StoreConfig,
        feedback: FeedbackDestination<A>,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let (in_flight, _) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(initial_state),
                reducer,
                environment,
                config,
                feedback,
                run_queue: Mutex::new(RunQueue {
                    queue: VecDeque::new(),
                    draining: false,
                }),
                registry: CancellationRegistry::new(),
                teardown: Mutex::new(CancelSignal::new()),
                shutdown: AtomicBool::new(false),
                in_flight: Arc::new(in_flight),
                action_broadcast,
            }),
        }
    }

    /// The configuration this store was built with
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Send an action to the store
    ///
    /// This is the primary way to interact with the store:
    /// 1. Appends the action to the run queue
    /// 2. If no dispatch is in progress, drains the queue on this call:
    ///    reduces each action under the state lock and schedules its effect
    /// 3. Otherwise waits until the current drainer has reduced it
    ///
    /// # Returns
    ///
    /// An [`EffectHandle`] for the tasks spawned by this action's effect,
    /// returned once the action and its synchronous `Send` chain have been
    /// reduced.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
    /// - [`StoreError::ChannelClosed`] if the reducer panicked while this
    ///   action was queued or being reduced by another caller
    ///
    /// # Panics
    ///
    /// If the reducer panics, the panic propagates to whichever caller is
    /// draining. Reducers should be pure functions that do not panic.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut handle = store.send(CounterAction::Increment).await?;
    /// handle.wait().await;
    /// ```
    #[tracing::instrument(skip(self, action), name = "store_send")]
    pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected action: store is shutting down");
            StoreMetrics::record_rejected();
            return Err(StoreError::ShutdownInProgress);
        }

        tracing::debug!("Processing action");
        let (ack, done) = oneshot::channel();
        self.shared.enqueue(action, Some(ack));
        done.await.map_err(|_| StoreError::ChannelClosed)
    }

    /// Send an action and wait for a matching result action
    ///
    /// Designed for request-response patterns. Subscribes to the action
    /// broadcast before sending, so a fast effect cannot slip past.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: Timeout expired before matching action received
    /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
    /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
    ///
    /// # Example
    ///
    /// ```ignore
    /// let result = store.send_and_wait_for(
    ///     Action::Load { id },
    ///     |a| matches!(a, Action::Loaded { .. } | Action::LoadFailed { .. }),
    ///     Duration::from_secs(10),
    /// ).await?;
    /// ```
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        // Subscribe BEFORE sending to avoid race condition
        let mut rx = self.shared.action_broadcast.subscribe();

        self.send(action).await?;

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // If the terminal action was dropped, the timeout catches it
                        tracing::warn!(skipped, "Action observer lagged, {} actions skipped", skipped);
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Subscribe to every action produced by effects
    ///
    /// # Notes
    ///
    /// - Only effect-produced actions are broadcast (including `Send`
    ///   chains), not actions passed to `send`
    /// - A receiver that falls more than `broadcast_capacity` behind skips
    ///   old actions and gets `RecvError::Lagged`
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.shared.action_broadcast.subscribe()
    }

    /// Read current state via a closure
    ///
    /// Takes the state lock, so the closure only ever sees state between
    /// reductions:
    ///
    /// ```ignore
    /// let count = store.state(|s| s.count);
    /// ```
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.shared.lock_state();
        f(&state)
    }

    /// Number of effect tasks currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.borrow()
    }

    /// Ids with at least one registered task still running
    #[must_use]
    pub fn cancellation_ids(&self) -> Vec<EffectId> {
        self.shared.registry.ids()
    }

    /// Cancel every task registered under `id`, from outside any reducer
    ///
    /// Returns the number of tasks signalled.
    pub fn cancel(&self, id: impl Into<EffectId>) -> usize {
        self.shared.registry.cancel(&id.into())
    }

    /// Cancel every running effect, with or without an id
    ///
    /// Effects scheduled afterwards run normally. Returns the number of
    /// tasks that were running.
    pub fn cancel_all(&self) -> usize {
        self.shared.cancel_all()
    }

    /// Wait until no effect task is running
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if tasks are still running when
    /// `timeout` expires.
    pub async fn wait_for_idle(&self, timeout: Duration) -> Result<(), StoreError> {
        let mut rx = self.shared.in_flight.subscribe();
        let idle = tokio::time::timeout(timeout, rx.wait_for(|running| *running == 0)).await;
        match idle {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(StoreError::ChannelClosed),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Initiate shutdown
    ///
    /// 1. Stops accepting new actions (`send` returns
    ///    [`StoreError::ShutdownInProgress`]; effect output is dropped)
    /// 2. Cancels every running effect
    /// 3. Waits up to `timeout` for their tasks to stop
    ///
    /// Calling it again is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if tasks are still running
    /// when the timeout expires. Cancellation is cooperative, so a task
    /// that never yields cannot be stopped early.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("Initiating shutdown");
        self.shared.shutdown.store(true, Ordering::Release);

        let running = self.cancel_all();
        if self.wait_for_idle(timeout).await.is_ok() {
            tracing::info!(cancelled = running, "All effects stopped, shutdown successful");
            return Ok(());
        }

        let pending = self.in_flight();
        tracing::error!(
            pending_effects = pending,
            "Shutdown timeout: {} effects still running",
            pending
        );
        Err(StoreError::ShutdownTimeout(pending))
    }

    /// Shut down with the configured default timeout
    ///
    /// # Errors
    ///
    /// See [`shutdown`](Self::shutdown).
    pub async fn shutdown_default(&self) -> Result<(), StoreError> {
        self.shutdown(self.shared.config.shutdown_timeout()).await
    }
}

impl<S, A, E, R> Clone for Store<S, A, E, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, A, E, R> std::fmt::Debug for Store<S, A, E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("in_flight", &*self.shared.in_flight.borrow())
            .field("registry", &self.shared.registry)
            .field("feedback", &self.shared.feedback)
            .field("shutdown", &self.shared.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
