//! Deterministic assertion engine over a real Store.
//!
//! A [`TestStore`] runs the production dispatch loop, but every action an
//! effect produces is parked in a [`PendingActions`] queue instead of being
//! reduced. The test then has to `receive` each one, in arrival order, and
//! declare how it changes state. Anything left over when the test ends is
//! reported by [`TestStore::finish`].

use crate::config::TestStoreConfig;
use crate::diff::StateDiff;
use crate::pending::PendingActions;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use unistore_core::{ActionSink, Reducer};
use unistore_runtime::{FeedbackDestination, Store, StoreConfig, StoreError};

/// Why a test-store assertion failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TestStoreError {
    /// The reducer produced a different state than the test declared
    #[error("State after {action} does not match the expected mutation:\n{diff}")]
    StateMismatch {
        /// The action that was reduced
        action: String,
        /// Expected vs actual, per field
        diff: StateDiff,
    },

    /// The test declared no change, but the reducer changed state
    #[error("State changed after {action}, but no change was expected:\n{diff}")]
    UnexpectedStateChange {
        /// The action that was reduced
        action: String,
        /// Expected vs actual, per field
        diff: StateDiff,
    },

    /// The head of the pending queue was not the expected action
    #[error("Expected to receive {expected}, but received {received}")]
    ActionMismatch {
        /// The action the test asked for
        expected: String,
        /// The action effects actually produced
        received: String,
    },

    /// No effect produced an action in time
    #[error("Expected to receive {expected}, but no action arrived within {timeout:?}")]
    Timeout {
        /// The action the test asked for
        expected: String,
        /// How long the harness waited
        timeout: Duration,
    },

    /// The test ended with work it never asserted
    #[error(
        "Unfulfilled at end of test: {count} unreceived action(s) {actions:?}, \
         {in_flight} effect(s) still running, cancellation ids {cancellation_ids:?}",
        count = .actions.len()
    )]
    Unfulfilled {
        /// Actions effects produced that were never received
        actions: Vec<String>,
        /// Effect tasks still running
        in_flight: usize,
        /// Ids with a live registration
        cancellation_ids: Vec<String>,
    },

    /// The underlying Store rejected the action
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Store wrapper that asserts every state change and every effect output
///
/// # Example
///
/// ```ignore
/// let store = TestStore::new(CounterState::default(), CounterReducer, env);
///
/// store.send(CounterAction::Increment, |s| s.count = 1).await;
/// store
///     .receive(CounterAction::Changed { from: 0, to: 1 }, |_| {})
///     .await;
///
/// store.finish().await;
/// ```
///
/// The panicking methods (`send`, `receive`, `finish`) suit test bodies;
/// the `try_*` forms return a [`TestStoreError`] for tests that inspect the
/// failure itself.
pub struct TestStore<S, A, E, R> {
    store: Store<S, A, E, R>,
    pending: Arc<PendingActions<A>>,
    config: TestStoreConfig,
    finished: bool,
}

impl<S, A, E, R> TestStore<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Clone + PartialEq + Debug + Serialize + Send + 'static,
    A: Clone + PartialEq + Debug + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Create a test store with the default [`TestStoreConfig`]
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_config(initial_state, reducer, environment, TestStoreConfig::default())
    }

    /// Create a test store with explicit timing configuration
    #[must_use]
    pub fn with_config(initial_state: S, reducer: R, environment: E, config: TestStoreConfig) -> Self {
        let pending = Arc::new(PendingActions::new());
        let sink = Arc::clone(&pending) as Arc<dyn ActionSink<A>>;
        let store = Store::with_feedback(
            initial_state,
            reducer,
            environment,
            StoreConfig::default(),
            FeedbackDestination::Queued(sink),
        );

        Self {
            store,
            pending,
            config,
            finished: false,
        }
    }

    /// Harness configuration
    #[must_use]
    pub const fn config(&self) -> &TestStoreConfig {
        &self.config
    }

    /// Send an action and assert the resulting state.
    ///
    /// `update` receives a copy of the state from before the action and must
    /// turn it into exactly the state the reducer produces. Pass `|_| {}` to
    /// declare that the action leaves state unchanged.
    ///
    /// # Errors
    ///
    /// - [`TestStoreError::StateMismatch`] if the declared state differs
    /// - [`TestStoreError::UnexpectedStateChange`] if no change was declared
    ///   but state changed
    /// - [`TestStoreError::Store`] if the store is shutting down
    pub async fn try_send<F>(&self, action: A, update: F) -> Result<(), TestStoreError>
    where
        F: FnOnce(&mut S),
    {
        tracing::debug!(?action, "TestStore send");
        self.reduce_and_compare(action, update).await
    }

    /// Send an action and assert the resulting state, panicking on failure
    ///
    /// # Panics
    ///
    /// On any [`TestStoreError`] from [`try_send`](Self::try_send).
    #[allow(clippy::panic)] // Test assertion
    pub async fn send<F>(&self, action: A, update: F)
    where
        F: FnOnce(&mut S),
    {
        if let Err(error) = self.try_send(action, update).await {
            panic!("{error}");
        }
    }

    /// Receive the next effect-produced action and assert the resulting
    /// state, waiting up to the configured receive timeout.
    ///
    /// # Errors
    ///
    /// See [`try_receive_with_timeout`](Self::try_receive_with_timeout).
    pub async fn try_receive<F>(&self, expected: A, update: F) -> Result<(), TestStoreError>
    where
        F: FnOnce(&mut S),
    {
        self.try_receive_with_timeout(expected, self.config.receive_timeout(), update)
            .await
    }

    /// Receive the next effect-produced action, waiting up to `timeout`.
    ///
    /// The head of the pending queue is consumed even if it does not match.
    ///
    /// # Errors
    ///
    /// - [`TestStoreError::Timeout`] if the queue stays empty for `timeout`
    /// - [`TestStoreError::ActionMismatch`] if the head is a different action
    /// - the state errors of [`try_send`](Self::try_send)
    pub async fn try_receive_with_timeout<F>(
        &self,
        expected: A,
        timeout: Duration,
        update: F,
    ) -> Result<(), TestStoreError>
    where
        F: FnOnce(&mut S),
    {
        let Some(received) = self.pending.pop(timeout).await else {
            return Err(TestStoreError::Timeout {
                expected: format!("{expected:?}"),
                timeout,
            });
        };

        if received != expected {
            return Err(TestStoreError::ActionMismatch {
                expected: format!("{expected:?}"),
                received: format!("{received:?}"),
            });
        }

        tracing::debug!(action = ?received, "TestStore receive");
        self.reduce_and_compare(received, update).await
    }

    /// Receive the next effect-produced action, panicking on failure
    ///
    /// # Panics
    ///
    /// On any [`TestStoreError`] from [`try_receive`](Self::try_receive).
    #[allow(clippy::panic)] // Test assertion
    pub async fn receive<F>(&self, expected: A, update: F)
    where
        F: FnOnce(&mut S),
    {
        if let Err(error) = self.try_receive(expected, update).await {
            panic!("{error}");
        }
    }

    /// Receive with an explicit timeout, panicking on failure
    ///
    /// # Panics
    ///
    /// On any [`TestStoreError`] from
    /// [`try_receive_with_timeout`](Self::try_receive_with_timeout).
    #[allow(clippy::panic)] // Test assertion
    pub async fn receive_with_timeout<F>(&self, expected: A, timeout: Duration, update: F)
    where
        F: FnOnce(&mut S),
    {
        if let Err(error) = self.try_receive_with_timeout(expected, timeout, update).await {
            panic!("{error}");
        }
    }

    /// Discard every pending action without reducing it
    ///
    /// Returns the discarded actions. Use it to opt out of exhaustive
    /// assertion for output the test does not care about.
    pub fn skip_received_actions(&self) -> Vec<A> {
        let skipped = self.pending.drain();
        tracing::debug!(count = skipped.len(), "Skipped pending actions");
        skipped
    }

    /// Cancel every running effect
    ///
    /// Returns the number of effect tasks that were running.
    pub fn cancel_in_flight_effects(&self) -> usize {
        self.store.cancel_all()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> S {
        self.store.state(Clone::clone)
    }

    /// Actions waiting to be received, head first
    #[must_use]
    pub fn pending_actions(&self) -> Vec<A> {
        self.pending.snapshot()
    }

    /// Number of effect tasks still running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.store.in_flight()
    }

    /// Check the end-of-test invariant.
    ///
    /// Waits up to the configured teardown grace for effects that are about
    /// to finish, then requires an empty pending queue and no running
    /// effects. Remaining effects are cancelled either way.
    ///
    /// # Errors
    ///
    /// Returns [`TestStoreError::Unfulfilled`] listing what was left over.
    pub async fn try_finish(mut self) -> Result<(), TestStoreError> {
        self.finished = true;

        // Timing out here is what the checks below report
        let _ = self.store.wait_for_idle(self.config.teardown_grace()).await;

        let actions = self.pending.drain();
        let in_flight = self.store.in_flight();
        let cancellation_ids = self.store.cancellation_ids();
        if in_flight > 0 {
            self.store.cancel_all();
        }

        if actions.is_empty() && in_flight == 0 {
            return Ok(());
        }

        Err(TestStoreError::Unfulfilled {
            actions: actions.iter().map(|a| format!("{a:?}")).collect(),
            in_flight,
            cancellation_ids: cancellation_ids.iter().map(|id| format!("{id:?}")).collect(),
        })
    }

    /// Check the end-of-test invariant, panicking on failure
    ///
    /// # Panics
    ///
    /// If [`try_finish`](Self::try_finish) reports unfulfilled work.
    #[allow(clippy::panic)] // Test assertion
    pub async fn finish(self) {
        if let Err(error) = self.try_finish().await {
            panic!("{error}");
        }
    }

    async fn reduce_and_compare<F>(&self, action: A, update: F) -> Result<(), TestStoreError>
    where
        F: FnOnce(&mut S),
    {
        let label = format!("{action:?}");
        let before = self.state();

        self.store.send(action).await?;

        let actual = self.state();
        let mut expected = before.clone();
        update(&mut expected);

        if expected == actual {
            return Ok(());
        }

        let diff = StateDiff::between(&expected, &actual);
        if expected == before {
            Err(TestStoreError::UnexpectedStateChange { action: label, diff })
        } else {
            Err(TestStoreError::StateMismatch { action: label, diff })
        }
    }
}

impl<S, A, E, R> Debug for TestStore<S, A, E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStore")
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<S, A, E, R> Drop for TestStore<S, A, E, R> {
    /// Dropping the inner Store tears down its effects. Unreceived actions
    /// are a test bug unless the test is already failing.
    #[allow(clippy::panic)] // Test assertion
    fn drop(&mut self) {
        if self.finished || std::thread::panicking() {
            return;
        }
        let unreceived = self.pending.len();
        if unreceived > 0 {
            panic!(
                "TestStore dropped with {unreceived} unreceived action(s); \
                 receive them, call skip_received_actions(), or call finish()"
            );
        }
    }
}
