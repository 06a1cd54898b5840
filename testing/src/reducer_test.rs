//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use unistore_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&Effect<A>)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Runs the reducer directly, without a Store: the returned effect is only
/// inspected, never executed.
///
/// # Example
///
/// ```ignore
/// use unistore_testing::ReducerTest;
///
/// ReducerTest::new(CounterReducer)
///     .with_env(test_environment())
///     .given_state(CounterState { count: 0 })
///     .when_action(CounterAction::Increment)
///     .then_state(|state| {
///         assert_eq!(state.count, 1);
///     })
///     .then_effect(|effect| {
///         assertions::assert_has_run_effect(effect);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
    S: Clone,
    A: Clone,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    ///
    /// Actions are reduced in the order given; effect assertions see the
    /// effect returned for the last one.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effect (Then)
    #[must_use]
    pub fn then_effect<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&Effect<A>) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effect = Effect::none();
        for action in self.actions {
            effect = self.reducer.reduce(&mut state, action, &env);
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effect);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use unistore_core::effect::{Effect, EffectId};

    /// Actions carried by `Send` effects anywhere in the tree, depth first
    #[must_use]
    pub fn sent_actions<A: Clone>(effect: &Effect<A>) -> Vec<A> {
        let mut sent = Vec::new();
        collect_sent(effect, &mut sent);
        sent
    }

    fn collect_sent<A: Clone>(effect: &Effect<A>, sent: &mut Vec<A>) {
        match effect {
            Effect::Send(action) => sent.push(action.clone()),
            Effect::Merge(children) | Effect::Concatenate(children) => {
                for child in children {
                    collect_sent(child, sent);
                }
            },
            Effect::Cancellable { effect, .. } => collect_sent(effect, sent),
            Effect::None | Effect::Run(_) | Effect::Cancel(_) => {},
        }
    }

    fn any<A>(effect: &Effect<A>, predicate: &dyn Fn(&Effect<A>) -> bool) -> bool {
        predicate(effect)
            || match effect {
                Effect::Merge(children) | Effect::Concatenate(children) => {
                    children.iter().any(|child| any(child, predicate))
                },
                Effect::Cancellable { effect, .. } => any(effect, predicate),
                _ => false,
            }
    }

    /// Assert that the effect does nothing
    ///
    /// # Panics
    ///
    /// Panics if the effect is anything but `Effect::None`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effect: &Effect<A>) {
        assert!(effect.is_none(), "Expected no effects, but found {effect:?}");
    }

    /// Assert exactly which actions the effect sends synchronously
    ///
    /// # Panics
    ///
    /// Panics if the `Send` actions in the tree differ from `expected`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_sends<A>(effect: &Effect<A>, expected: &[A])
    where
        A: Clone + PartialEq + std::fmt::Debug,
    {
        assert_eq!(sent_actions(effect), expected, "Sent actions differ");
    }

    /// Assert that the effect contains at least one asynchronous `Run`
    ///
    /// # Panics
    ///
    /// Panics if no `Run` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_run_effect<A>(effect: &Effect<A>) {
        assert!(
            any(effect, &|e| matches!(e, Effect::Run(_))),
            "Expected at least one Run effect, but none found"
        );
    }

    /// Assert that the effect cancels `id`
    ///
    /// # Panics
    ///
    /// Panics if no `Cancel` for `id` is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels<A>(effect: &Effect<A>, id: impl Into<EffectId>) {
        let id = id.into();
        assert!(
            any(effect, &|e| matches!(e, Effect::Cancel(cancelled) if *cancelled == id)),
            "Expected a Cancel({id:?}) effect, but none found"
        );
    }

    /// Assert that the effect is registered under `id`
    ///
    /// # Panics
    ///
    /// Panics if no `Cancellable` scope for `id` is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancellable<A>(effect: &Effect<A>, id: impl Into<EffectId>) {
        let id = id.into();
        assert!(
            any(effect, &|e| matches!(e, Effect::Cancellable { id: scope, .. } if *scope == id)),
            "Expected an effect cancellable under {id:?}, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unistore_core::effect::Effect;
    use unistore_core::reducer::Reducer;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        Load,
        Loaded(i32),
        Stop,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Effect<Self::Action> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    Effect::none()
                },
                TestAction::Decrement => {
                    state.count -= 1;
                    Effect::send(TestAction::Loaded(state.count))
                },
                TestAction::Load => Effect::future(async { Some(TestAction::Loaded(7)) })
                    .cancellable("load"),
                TestAction::Loaded(value) => {
                    state.count = value;
                    Effect::none()
                },
                TestAction::Stop => Effect::cancel("load"),
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effect(|effect| {
                assertions::assert_no_effects(effect);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_action_sequence() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Increment)
            .when_action(TestAction::Decrement)
            .then_state(|state| {
                assert_eq!(state.count, 5);
            })
            .then_effect(|effect| {
                assertions::assert_sends(effect, &[TestAction::Loaded(5)]);
            })
            .run();
    }

    #[test]
    fn test_effect_shape_assertions() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Load)
            .then_effect(|effect| {
                assertions::assert_has_run_effect(effect);
                assertions::assert_cancellable(effect, "load");
                assert!(assertions::sent_actions(effect).is_empty());
            })
            .run();

        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Stop)
            .then_effect(|effect| {
                assertions::assert_cancels(effect, "load");
            })
            .run();
    }
}
