//! # Counter Example
//!
//! A counter demonstrating the Unistore architecture.
//!
//! This example showcases:
//! - A reducer that returns every shape of effect
//! - A long-running timer stopped by cancellation id
//! - Delayed, debounced and concatenated timed effects on an injected scheduler
//! - A fallible lookup whose failure comes back as an action
//!
//! ## Architecture
//!
//! All time flows through the [`Scheduler`] in [`CounterEnvironment`]:
//! production uses the tokio timer, tests use virtual time and assert every
//! action the effects produce.
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterAction, CounterEnvironment, CounterReducer, CounterState};
//! use unistore_runtime::{Store, TokioScheduler};
//!
//! # async fn example() -> Result<(), unistore_runtime::StoreError> {
//! let env = CounterEnvironment::new(TokioScheduler::new());
//! let store = Store::new(CounterState::default(), CounterReducer::new(), env);
//!
//! store.send(CounterAction::Increment).await?;
//! let count = store.state(|s| s.count);
//! assert_eq!(count, 1);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use unistore_core::effect::{Effect, EffectId, Emitter};
use unistore_core::environment::Scheduler;
use unistore_core::reducer::Reducer;

/// Interval between timer ticks
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Quiet period before a burst of nudges becomes one increment
pub const NUDGE_DEBOUNCE: Duration = Duration::from_millis(300);

/// Simulated latency of the number-fact lookup
pub const FACT_LATENCY: Duration = Duration::from_millis(500);

/// Counter state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
    /// Whether the ticking timer is running
    pub timer_running: bool,
    /// Remaining countdown steps, if a countdown is active
    pub countdown: Option<u32>,
    /// Whether a fact lookup is in progress
    pub loading_fact: bool,
    /// Last fact loaded about the count
    pub fact: Option<String>,
    /// Last lookup failure
    pub fact_error: Option<String>,
}

/// Counter actions
///
/// User intents and the responses effects feed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterAction {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// The count changed (emitted after every increment/decrement)
    Changed {
        /// Previous value
        from: i64,
        /// New value
        to: i64,
    },
    /// Reset the counter to 0 and stop everything running
    Reset,
    /// Start incrementing once per [`TICK_INTERVAL`]
    StartTimer,
    /// Stop the timer
    StopTimer,
    /// Timer fired
    TimerTicked,
    /// Increment after `delay`
    DelayedIncrement {
        /// How long to wait
        delay: Duration,
    },
    /// Increment once nudges stop for [`NUDGE_DEBOUNCE`]
    Nudge,
    /// Increment `n` times concurrently
    Burst(u8),
    /// Count down from `from`, one step per second, then finish
    Countdown {
        /// Starting value
        from: u32,
    },
    /// One countdown step
    CountdownStep(u32),
    /// Countdown reached zero
    CountdownFinished,
    /// Look up a fact about the current count
    RequestFact,
    /// Lookup succeeded
    FactLoaded(String),
    /// Lookup failed
    FactFailed(String),
}

/// Cancellation ids for the counter's long-running effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterEffect {
    /// The ticking timer
    Timer,
    /// Debounced nudges
    Nudge,
    /// Countdown sequence
    Countdown,
    /// Fact lookup
    Fact,
}

impl From<CounterEffect> for EffectId {
    fn from(id: CounterEffect) -> Self {
        Self::new(id)
    }
}

/// Counter environment
///
/// Holds the scheduler every timed effect sleeps on.
#[derive(Debug)]
pub struct CounterEnvironment<S> {
    /// Time source for timers, delays and debounces
    pub scheduler: Arc<S>,
}

impl<S> CounterEnvironment<S> {
    /// Create a new counter environment with the given scheduler
    #[must_use]
    pub fn new(scheduler: S) -> Self {
        Self::shared(Arc::new(scheduler))
    }

    /// Create an environment around a scheduler the caller keeps a handle to
    #[must_use]
    pub const fn shared(scheduler: Arc<S>) -> Self {
        Self { scheduler }
    }
}

/// Counter reducer
///
/// Generic over the Scheduler type S to work with any time source.
#[derive(Debug, Clone, Copy)]
pub struct CounterReducer<S> {
    _phantom: std::marker::PhantomData<fn() -> S>,
}

impl<S> CounterReducer<S> {
    /// Create a new counter reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S> Default for CounterReducer<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fact lookup standing in for a remote service
///
/// # Errors
///
/// Negative numbers have no facts.
pub fn lookup_fact(n: i64) -> Result<String, String> {
    if n < 0 {
        return Err(format!("no facts about negative numbers ({n})"));
    }
    let parity = if n % 2 == 0 { "even" } else { "odd" };
    Ok(format!("{n} is {parity}"))
}

impl<S> CounterReducer<S>
where
    S: Scheduler + 'static,
{
    fn changed(from: i64, to: i64) -> Effect<CounterAction> {
        Effect::future(async move { Some(CounterAction::Changed { from, to }) })
    }

    fn timer(scheduler: Arc<S>) -> Effect<CounterAction> {
        Effect::run(move |emitter: Emitter<CounterAction>| async move {
            loop {
                scheduler.sleep(TICK_INTERVAL).await;
                if !emitter.emit(CounterAction::TimerTicked) {
                    break;
                }
            }
        })
        .cancellable_in_flight(CounterEffect::Timer)
    }

    fn countdown(scheduler: &Arc<S>, from: u32) -> Effect<CounterAction> {
        let steps = (0..from)
            .rev()
            .map(|remaining| {
                Effect::delay(scheduler, Duration::from_secs(1), CounterAction::CountdownStep(remaining))
            })
            .chain(std::iter::once(Effect::send(CounterAction::CountdownFinished)));
        Effect::concatenate(steps).cancellable_in_flight(CounterEffect::Countdown)
    }

    fn fact(scheduler: Arc<S>, n: i64) -> Effect<CounterAction> {
        Effect::try_future(
            async move {
                scheduler.sleep(FACT_LATENCY).await;
                lookup_fact(n).map(CounterAction::FactLoaded)
            },
            CounterAction::FactFailed,
        )
        .cancellable_in_flight(CounterEffect::Fact)
    }
}

impl<S> Reducer for CounterReducer<S>
where
    S: Scheduler + 'static,
{
    type State = CounterState;
    type Action = CounterAction;
    type Environment = CounterEnvironment<S>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        match action {
            CounterAction::Increment => {
                let from = state.count;
                state.count += 1;
                Self::changed(from, state.count)
            },
            CounterAction::Decrement => {
                let from = state.count;
                state.count -= 1;
                Self::changed(from, state.count)
            },
            CounterAction::Changed { .. } => Effect::none(),

            CounterAction::Reset => {
                tracing::debug!(count = state.count, "Resetting counter");
                *state = CounterState::default();
                Effect::merge([
                    Effect::cancel(CounterEffect::Timer),
                    Effect::cancel(CounterEffect::Nudge),
                    Effect::cancel(CounterEffect::Countdown),
                    Effect::cancel(CounterEffect::Fact),
                ])
            },

            CounterAction::StartTimer => {
                state.timer_running = true;
                Self::timer(Arc::clone(&env.scheduler))
            },
            CounterAction::StopTimer => {
                state.timer_running = false;
                Effect::cancel(CounterEffect::Timer)
            },
            CounterAction::TimerTicked => {
                state.count += 1;
                Effect::none()
            },

            CounterAction::DelayedIncrement { delay } => {
                Effect::delay(&env.scheduler, delay, CounterAction::Increment)
            },
            CounterAction::Nudge => Effect::send(CounterAction::Increment).debounce(
                CounterEffect::Nudge,
                NUDGE_DEBOUNCE,
                &env.scheduler,
            ),
            CounterAction::Burst(n) => Effect::merge(
                (0..n).map(|_| Effect::future(async { Some(CounterAction::Increment) })),
            ),

            CounterAction::Countdown { from } => {
                state.countdown = Some(from);
                Self::countdown(&env.scheduler, from)
            },
            CounterAction::CountdownStep(remaining) => {
                state.countdown = Some(remaining);
                Effect::none()
            },
            CounterAction::CountdownFinished => {
                state.countdown = None;
                Effect::none()
            },

            CounterAction::RequestFact => {
                state.loading_fact = true;
                state.fact_error = None;
                Self::fact(Arc::clone(&env.scheduler), state.count)
            },
            CounterAction::FactLoaded(fact) => {
                state.loading_fact = false;
                state.fact = Some(fact);
                Effect::none()
            },
            CounterAction::FactFailed(error) => {
                tracing::warn!(%error, "Fact lookup failed");
                state.loading_fact = false;
                state.fact_error = Some(error);
                Effect::none()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use unistore_testing::ReducerTest;
    use unistore_testing::TestScheduler;
    use unistore_testing::reducer_test::assertions;

    fn env() -> CounterEnvironment<TestScheduler> {
        CounterEnvironment::new(TestScheduler::new())
    }

    #[test]
    fn test_increment() {
        ReducerTest::new(CounterReducer::new())
            .with_env(env())
            .given_state(CounterState::default())
            .when_action(CounterAction::Increment)
            .then_state(|state| assert_eq!(state.count, 1))
            .then_effect(|effect| assertions::assert_has_run_effect(effect))
            .run();
    }

    #[test]
    fn test_decrement() {
        ReducerTest::new(CounterReducer::new())
            .with_env(env())
            .given_state(CounterState {
                count: 5,
                ..CounterState::default()
            })
            .when_action(CounterAction::Decrement)
            .then_state(|state| assert_eq!(state.count, 4))
            .run();
    }

    #[test]
    fn test_reset_cancels_everything() {
        ReducerTest::new(CounterReducer::new())
            .with_env(env())
            .given_state(CounterState {
                count: 42,
                timer_running: true,
                ..CounterState::default()
            })
            .when_action(CounterAction::Reset)
            .then_state(|state| assert_eq!(*state, CounterState::default()))
            .then_effect(|effect| {
                assertions::assert_cancels(effect, CounterEffect::Timer);
                assertions::assert_cancels(effect, CounterEffect::Nudge);
                assertions::assert_cancels(effect, CounterEffect::Countdown);
                assertions::assert_cancels(effect, CounterEffect::Fact);
            })
            .run();
    }

    #[test]
    fn test_timer_is_cancellable() {
        ReducerTest::new(CounterReducer::new())
            .with_env(env())
            .given_state(CounterState::default())
            .when_action(CounterAction::StartTimer)
            .then_state(|state| assert!(state.timer_running))
            .then_effect(|effect| assertions::assert_cancellable(effect, CounterEffect::Timer))
            .run();
    }

    #[test]
    fn test_changed_is_a_no_op() {
        ReducerTest::new(CounterReducer::new())
            .with_env(env())
            .given_state(CounterState::default())
            .when_action(CounterAction::Changed { from: 0, to: 1 })
            .then_state(|state| assert_eq!(*state, CounterState::default()))
            .then_effect(|effect| assertions::assert_no_effects(effect))
            .run();
    }

    proptest! {
        #[test]
        fn prop_count_is_increments_minus_decrements(steps in prop::collection::vec(any::<bool>(), 0..64)) {
            let reducer = CounterReducer::new();
            let env = env();
            let mut state = CounterState::default();
            for &up in &steps {
                let action = if up { CounterAction::Increment } else { CounterAction::Decrement };
                let _ = reducer.reduce(&mut state, action, &env);
            }
            let ups = steps.iter().filter(|&&up| up).count();
            let expected = i64::try_from(ups).unwrap() * 2 - i64::try_from(steps.len()).unwrap();
            prop_assert_eq!(state.count, expected);
        }
    }

    #[test]
    fn test_lookup_fact() {
        assert_eq!(lookup_fact(4), Ok("4 is even".to_string()));
        assert_eq!(lookup_fact(7), Ok("7 is odd".to_string()));
        assert!(lookup_fact(-1).is_err());
    }
}
