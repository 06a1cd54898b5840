//! # Unistore Core
//!
//! Core traits and types for the Unistore architecture.
//!
//! This crate provides the vocabulary of a unidirectional state-management
//! runtime: a single mutable State is evolved only by a pure Reducer driven
//! by discrete Actions, and every externally observable piece of work is
//! described as an [`Effect`](effect::Effect) value instead of being
//! performed inline.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state owned by exactly one Store
//! - **Action**: All possible inputs to a reducer (user intents, effect responses)
//! - **Reducer**: Pure function `(&mut State, Action, &Environment) → Effect`
//! - **Effect**: Description of asynchronous work that may feed actions back
//! - **Environment**: Injected capabilities (clock, scheduler, id generator)
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Cooperative, id-based cancellation
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```
//! use unistore_core::{effect::Effect, reducer::Reducer};
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct CounterState {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum CounterAction {
//!     Increment,
//!     Changed { from: i64, to: i64 },
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> Effect<CounterAction> {
//!         match action {
//!             CounterAction::Increment => {
//!                 let from = state.count;
//!                 state.count += 1;
//!                 Effect::future(async move {
//!                     Some(CounterAction::Changed { from, to: from + 1 })
//!                 })
//!             },
//!             CounterAction::Changed { .. } => Effect::none(),
//!         }
//!     }
//! }
//!
//! let mut state = CounterState::default();
//! let effect = CounterReducer.reduce(&mut state, CounterAction::Increment, &());
//! assert_eq!(state.count, 1);
//! assert!(!effect.is_none());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Effect values, cancellation ids and the emit-channel handle
pub mod effect;

/// Reducer composition utilities (`combine_reducers`, `scope_reducer`)
pub mod composition;

mod emitter;
mod id;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(&mut State, Action, &Environment) → Effect`.
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected capabilities this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for SearchReducer {
    ///     type State = SearchState;
    ///     type Action = SearchAction;
    ///     type Environment = SearchEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut SearchState,
    ///         action: SearchAction,
    ///         env: &SearchEnvironment,
    ///     ) -> Effect<SearchAction> {
    ///         match action {
    ///             SearchAction::QueryChanged(query) => {
    ///                 state.query = query.clone();
    ///                 Effect::send(SearchAction::Search(query))
    ///                     .debounce("search", Duration::from_millis(300), &env.scheduler)
    ///             }
    ///             _ => Effect::none(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected capabilities
        type Environment;

        /// Reduce an action into state changes and an effect
        ///
        /// This is a pure function that:
        /// 1. Updates state in place
        /// 2. Returns a description of the work to run next
        ///
        /// The returned effect is inert: nothing runs until a Store schedules it.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effect<Self::Action>;
    }
}

/// Environment module - Capability traits
///
/// All side-effecting capabilities a reducer may need are abstracted behind
/// traits and injected via the Environment parameter. The runtime never
/// inspects them; tests swap in deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};
    use futures::future::BoxFuture;
    use std::sync::Arc;
    use std::time::Duration;

    /// Clock trait - abstracts wall-clock reads for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// struct SystemClock;
    /// impl Clock for SystemClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         Utc::now()
    ///     }
    /// }
    ///
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Scheduler trait - the time source effects suspend on
    ///
    /// Production uses the tokio timer; tests use a virtual-time scheduler
    /// that only moves when the test advances it.
    pub trait Scheduler: Clock {
        /// Returns a future that completes once `duration` has elapsed on
        /// this scheduler's timeline.
        ///
        /// The deadline is fixed when this method is called, not when the
        /// returned future is first polled.
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

        /// Time elapsed on this scheduler since it was created
        fn elapsed(&self) -> Duration;
    }

    /// Id generator trait - source of fresh identifiers
    pub trait IdGenerator: Send + Sync {
        /// Produce the next identifier
        fn next_id(&self) -> u64;
    }

    impl<T: Clock + ?Sized> Clock for Arc<T> {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }
    }

    impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            (**self).sleep(duration)
        }

        fn elapsed(&self) -> Duration {
            (**self).elapsed()
        }
    }

    impl<T: IdGenerator + ?Sized> IdGenerator for Arc<T> {
        fn next_id(&self) -> u64 {
            (**self).next_id()
        }
    }
}

pub use effect::{ActionSink, CancelSignal, Effect, EffectId, Emitter};
pub use reducer::Reducer;
