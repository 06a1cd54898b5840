//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`scope_reducer`**: Embed a child feature's reducer in a parent domain
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use unistore_core::{Effect, Reducer};
//! use unistore_core::composition::combine_reducers;
//!
//! #[derive(Clone, Default)]
//! struct MyState {
//!     count: i32,
//!     name: String,
//! }
//!
//! #[derive(Clone)]
//! enum MyAction {
//!     Increment,
//!     SetName(String),
//! }
//!
//! struct CounterReducer;
//! struct NameReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut MyState, action: MyAction, _env: &()) -> Effect<MyAction> {
//!         if matches!(action, MyAction::Increment) {
//!             state.count += 1;
//!         }
//!         Effect::none()
//!     }
//! }
//!
//! impl Reducer for NameReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut MyState, action: MyAction, _env: &()) -> Effect<MyAction> {
//!         if let MyAction::SetName(name) = action {
//!             state.name = name;
//!         }
//!         Effect::none()
//!     }
//! }
//!
//! let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);
//! let mut state = MyState::default();
//! let _ = combined.reduce(&mut state, MyAction::Increment, &());
//! assert_eq!(state.count, 1);
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use std::marker::PhantomData;

/// Boxed reducer over a fixed state/action/environment triple
pub type BoxedReducer<S, A, E> = Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer runs in order against the same state, and the effects they
/// return are merged so they run concurrently.
#[must_use]
pub fn combine_reducers<S, A, E>(reducers: Vec<BoxedReducer<S, A, E>>) -> CombinedReducer<S, A, E>
where
    A: Clone,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E> {
    reducers: Vec<BoxedReducer<S, A, E>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    A: Clone,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        let effects: Vec<_> = self
            .reducers
            .iter()
            .map(|reducer| reducer.reduce(state, action.clone(), env))
            .collect();

        Effect::merge(effects)
    }
}

/// Embeds a child reducer into a parent domain.
///
/// - `state` focuses the parent state on the child's slice
/// - `extract` picks the child action out of a parent action (`None` means
///   the action is not for this child and is ignored)
/// - `embed` wraps the child's effect-produced actions back into the parent
///   action type
/// - `env` projects the parent environment onto the child's
///
/// # Examples
///
/// ```
/// use unistore_core::{Effect, Reducer};
/// use unistore_core::composition::scope_reducer;
///
/// #[derive(Clone, Default)]
/// struct CounterState {
///     count: i32,
/// }
///
/// #[derive(Clone, Debug)]
/// enum CounterAction {
///     Increment,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = CounterState;
///     type Action = CounterAction;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut CounterState, _action: CounterAction, _env: &()) -> Effect<CounterAction> {
///         state.count += 1;
///         Effect::none()
///     }
/// }
///
/// #[derive(Clone, Default)]
/// struct AppState {
///     counter: CounterState,
///     title: String,
/// }
///
/// #[derive(Clone, Debug)]
/// enum AppAction {
///     Counter(CounterAction),
///     Rename(String),
/// }
///
/// let scoped = scope_reducer(
///     CounterReducer,
///     |app: &mut AppState| &mut app.counter,
///     |action: AppAction| match action {
///         AppAction::Counter(inner) => Some(inner),
///         AppAction::Rename(_) => None,
///     },
///     AppAction::Counter,
///     |env: &()| env,
/// );
///
/// let mut state = AppState::default();
/// let _ = scoped.reduce(&mut state, AppAction::Counter(CounterAction::Increment), &());
/// assert_eq!(state.counter.count, 1);
/// ```
pub fn scope_reducer<S, A, E, R>(
    reducer: R,
    state: fn(&mut S) -> &mut R::State,
    extract: fn(A) -> Option<R::Action>,
    embed: fn(R::Action) -> A,
    env: fn(&E) -> &R::Environment,
) -> ScopedReducer<S, A, E, R>
where
    R: Reducer,
{
    ScopedReducer {
        reducer,
        state,
        extract,
        embed,
        env,
        _phantom: PhantomData,
    }
}

/// A reducer focused on a slice of a parent domain.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, A, E, R>
where
    R: Reducer,
{
    reducer: R,
    state: fn(&mut S) -> &mut R::State,
    extract: fn(A) -> Option<R::Action>,
    embed: fn(R::Action) -> A,
    env: fn(&E) -> &R::Environment,
    _phantom: PhantomData<fn() -> (S, A, E)>,
}

impl<S, A, E, R> Reducer for ScopedReducer<S, A, E, R>
where
    R: Reducer,
    R::Action: Send + 'static,
    A: Send + 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effect<Self::Action> {
        let Some(child_action) = (self.extract)(action) else {
            return Effect::none();
        };

        let child_state = (self.state)(state);
        let child_env = (self.env)(env);
        self.reducer
            .reduce(child_state, child_action, child_env)
            .map(self.embed)
    }
}
