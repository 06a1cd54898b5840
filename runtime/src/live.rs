//! Production implementations of the environment capabilities.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use unistore_core::environment::{Clock, IdGenerator, Scheduler};

/// Wall clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Scheduler backed by the tokio timer
///
/// Honors `tokio::time::pause`, so it can also be driven by tokio's own
/// test clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioScheduler {
    origin: Instant,
}

impl TokioScheduler {
    /// Create a scheduler whose elapsed time starts now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioScheduler {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Scheduler for TokioScheduler {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        // Deadline fixed at call time; overlong durations clamp to the far future
        tokio::time::sleep(duration).boxed()
    }

    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Random identifiers from the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> u64 {
        rand::thread_rng().r#gen()
    }
}
