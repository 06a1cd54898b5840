//! # Unistore Runtime
//!
//! Runtime implementation for the Unistore architecture.
//!
//! This crate provides the Store runtime that serializes reducer execution
//! and schedules the effects reducers return.
//!
//! ## Core Components
//!
//! - **Store**: Owns the state and the single dispatch entry point
//! - **Effect Executor**: Runs effect descriptions and feeds actions back
//! - **Cancellation Registry**: Maps effect ids to the tasks running under them
//! - **Effect Handle**: Lets a caller wait for the effects of one action
//!
//! ## Example
//!
//! ```ignore
//! use unistore_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! let mut handle = store.send(Action::DoSomething).await?;
//! handle.wait().await;
//!
//! // Read state
//! let value = store.state(|s| s.some_field);
//! ```

/// Store configuration (serde, environment overrides, validation)
pub mod config;

/// Completion tracking for the effects of a single action
pub mod handle;

/// Cancellation registry keyed by effect id
pub mod registry;

/// Production capabilities (system clock, tokio timer, random ids)
pub mod live;

/// Prometheus metrics for observability
pub mod metrics;

/// Store runtime for coordinating reducer execution and effect handling
pub mod store;

mod executor;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to stop
        ///
        /// Some effect tasks were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for an action or for effects to complete
        ///
        /// Returned by `send_and_wait_for`, `wait_for_idle` and
        /// `EffectHandle::wait_with_timeout` when the deadline passes.
        #[error("Timeout waiting for action")]
        Timeout,

        /// The dispatch or broadcast channel closed before a result arrived
        ///
        /// Typically means the store is shutting down, or the reducer
        /// panicked while the action was queued.
        #[error("Action channel closed")]
        ChannelClosed,
    }
}

pub use config::{ConfigError, StoreConfig};
pub use error::StoreError;
pub use handle::EffectHandle;
pub use live::{RandomIdGenerator, SystemClock, TokioScheduler};
pub use registry::{CancellationRegistry, Registration};
pub use store::{FeedbackDestination, Store};
