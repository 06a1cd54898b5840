//! # Unistore Testing
//!
//! Testing utilities and helpers for the Unistore architecture.
//!
//! This crate provides:
//! - [`TestStore`]: exhaustive assertion of every state change and every
//!   action produced by effects
//! - [`TestScheduler`]: virtual time that only moves when the test says so
//! - Mock implementations of Environment traits
//! - [`ReducerTest`]: Given-When-Then checks of a reducer without a Store
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use unistore_testing::{TestScheduler, TestStore};
//!
//! #[tokio::test]
//! async fn test_search_debounce() {
//!     let scheduler = Arc::new(TestScheduler::new());
//!     let store = TestStore::new(
//!         SearchState::default(),
//!         SearchReducer,
//!         SearchEnvironment { scheduler: Arc::clone(&scheduler) },
//!     );
//!
//!     store.send(SearchAction::QueryChanged("ru".into()), |s| s.query = "ru".into()).await;
//!     scheduler.advance(Duration::from_millis(300)).await;
//!     store.receive(SearchAction::Search("ru".into()), |s| s.searching = true).await;
//!
//!     store.finish().await;
//! }
//! ```

pub mod config;
pub mod diff;
pub mod pending;
pub mod reducer_test;
pub mod scheduler;
pub mod test_store;

use chrono::{DateTime, Utc};
use unistore_core::environment::{Clock, IdGenerator};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use unistore_testing::mocks::FixedClock;
    /// use unistore_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Ids counting up from a starting value
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Generator whose first id is 1
        #[must_use]
        pub const fn new() -> Self {
            Self::starting_at(1)
        }

        /// Generator whose first id is `first`
        #[must_use]
        pub const fn starting_at(first: u64) -> Self {
            Self {
                next: AtomicU64::new(first),
            }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new()
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> u64 {
            self.next.fetch_add(1, Ordering::SeqCst)
        }
    }
}

/// Install a `tracing` subscriber that writes through the test harness
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call
/// installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use config::TestStoreConfig;
pub use diff::{Difference, StateDiff};
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use pending::PendingActions;
pub use reducer_test::ReducerTest;
pub use scheduler::{ImmediateScheduler, TestScheduler};
pub use test_store::{TestStore, TestStoreError};
