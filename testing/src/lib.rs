//! # Tirtha Testing
//!
//! Testing utilities and helpers for the Tirtha architecture.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (fixed clocks)
//! - A fluent Given-When-Then harness for reducer unit tests
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use tirtha_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(BookingReducer::new())
//!     .with_env(test_env())
//!     .given_state(BookingState::default())
//!     .when_action(BookingAction::ConfirmBooking { .. })
//!     .then_state(|state| assert_eq!(state.count(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use tirtha_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tirtha_testing::mocks::FixedClock;
    /// use tirtha_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-06-01 06:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen
    /// in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-06-01T06:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fluent Given-When-Then harness for reducer unit tests
pub mod reducer_test {
    #![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

    use tirtha_core::{effect::Effect, reducer::Reducer};

    type StateAssertion<S> = Box<dyn FnOnce(&S)>;
    type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

    /// Fluent API for testing reducers with readable Given-When-Then syntax
    ///
    /// # Example
    ///
    /// ```ignore
    /// ReducerTest::new(ChantReducer::new())
    ///     .with_env(test_environment())
    ///     .given_state(ChantState::default())
    ///     .when_action(ChantAction::Increment)
    ///     .then_state(|state| assert_eq!(state.count, 1))
    ///     .then_effects(|effects| assert_eq!(effects.len(), 1))
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

        /// Set the action to test (When)
        ///
        /// May be called repeatedly; actions run in order and the effect
        /// assertions see the effects of the **last** action.
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

        /// Add an assertion about the resulting effects (Then)
        #[must_use]
        pub fn then_effects<F>(mut self, assertion: F) -> Self
        where
            F: FnOnce(&[Effect<A>]) + 'static,
        {
            self.effect_assertions.push(Box::new(assertion));
            self
        }

        /// Run the test and execute all assertions
        ///
        /// # Panics
        ///
        /// Panics if initial state, at least one action, or the environment
        /// is missing, or if any assertion fails.
        #[allow(clippy::panic, clippy::expect_used)] // Test code can panic
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

            let mut effects = smallvec::SmallVec::new();
            for action in self.actions {
                effects = self.reducer.reduce(&mut state, action, &env);
            }

            for assertion in self.state_assertions {
                assertion(&state);
            }

            for assertion in self.effect_assertions {
                assertion(&effects);
            }
        }
    }

    /// Helper assertions for effects
    pub mod assertions {
        use tirtha_core::effect::Effect;

        /// Assert that there are no effects (empty or a single no-op)
        ///
        /// # Panics
        ///
        /// Panics if any real effect is present.
        #[allow(clippy::panic)] // Test assertion
        pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
            assert!(
                effects.is_empty() || matches!(effects, [Effect::None]),
                "Expected no effects, but found {}: {:?}",
                effects.len(),
                effects
            );
        }

        /// Assert the number of effects
        ///
        /// # Panics
        ///
        /// Panics if the number of effects doesn't match.
        #[allow(clippy::panic)] // Test assertion
        pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
            assert_eq!(
                effects.len(),
                expected,
                "Expected {} effects, but found {}",
                expected,
                effects.len()
            );
        }

        /// Assert that effects contain at least one `Future` effect
        ///
        /// # Panics
        ///
        /// Panics if no `Future` effect is found.
        #[allow(clippy::panic)] // Test assertion
        pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
            assert!(
                effects.iter().any(|e| matches!(e, Effect::Future(_))),
                "Expected at least one Future effect, but none found"
            );
        }

        /// Assert that effects contain at least one `Delay` effect
        ///
        /// # Panics
        ///
        /// Panics if no `Delay` effect is found.
        #[allow(clippy::panic)] // Test assertion
        pub fn assert_has_delay_effect<A>(effects: &[Effect<A>]) {
            assert!(
                effects.iter().any(|e| matches!(e, Effect::Delay { .. })),
                "Expected at least one Delay effect, but none found"
            );
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;
    use tirtha_core::{effect::Effect, reducer::Reducer};

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = test_clock();
        use tirtha_core::environment::Clock;
        assert_eq!(clock.now(), clock.now());
    }

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec::smallvec![Effect::None]
                },
            }
        }
    }

    #[test]
    fn reducer_test_runs_assertions() {
        ReducerTest::new(TestReducer)
            .with_env(())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .when_action(TestAction::Increment)
            .then_state(|state| assert_eq!(state.count, 2))
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
