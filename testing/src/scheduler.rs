//! Virtual time for deterministic effect tests.
//!
//! [`TestScheduler`] never moves on its own. Effects that sleep on it stay
//! suspended until the test calls [`TestScheduler::advance`] or
//! [`TestScheduler::run`], which makes the arrival order of timed actions a
//! function of the test script instead of wall-clock races.

use crate::mocks::test_clock;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use unistore_core::environment::{Clock, Scheduler};

/// How many times the scheduler yields to the runtime after waking a timer
///
/// Enough for a woken task to feed an action back through the Store and for
/// any task spawned by that reduction to be polled once and register its
/// own timers.
const SETTLE_YIELDS: usize = 16;

/// Sleepers keyed by (deadline, registration order)
type Sleepers = BTreeMap<(Duration, u64), oneshot::Sender<()>>;

#[derive(Default)]
struct Timeline {
    now: Duration,
    next_seq: u64,
    sleepers: Sleepers,
}

impl Timeline {
    /// Drop sleepers whose future was dropped (cancelled effects)
    fn prune(&mut self) {
        self.sleepers.retain(|_, waker| !waker.is_closed());
    }

    /// Remove the earliest sleeper due at or before `target`
    fn pop_due(&mut self, target: Duration) -> Option<(Duration, oneshot::Sender<()>)> {
        self.prune();
        let (&(deadline, seq), _) = self.sleepers.first_key_value()?;
        if deadline > target {
            return None;
        }
        self.sleepers
            .remove(&(deadline, seq))
            .map(|waker| (deadline, waker))
    }
}

/// Manually advanced scheduler
///
/// Use it on a current-thread runtime (the `#[tokio::test]` default): the
/// scheduler yields to the runtime to let woken effects run, which is only
/// deterministic when nothing runs in parallel.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use unistore_core::environment::Scheduler;
/// use unistore_testing::TestScheduler;
///
/// # tokio_test::block_on(async {
/// let scheduler = Arc::new(TestScheduler::new());
/// let sleep = scheduler.sleep(Duration::from_secs(5));
/// assert_eq!(scheduler.pending_timers(), 1);
///
/// scheduler.advance(Duration::from_secs(5)).await;
/// sleep.await;
/// assert_eq!(scheduler.elapsed(), Duration::from_secs(5));
/// # });
/// ```
pub struct TestScheduler {
    epoch: DateTime<Utc>,
    timeline: Mutex<Timeline>,
}

impl TestScheduler {
    /// Scheduler whose clock starts at [`test_clock`]'s instant
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(test_clock().now())
    }

    /// Scheduler whose clock starts at `epoch`
    #[must_use]
    pub fn starting_at(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            timeline: Mutex::new(Timeline::default()),
        }
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sleeps still waiting for their deadline
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        let mut timeline = self.timeline();
        timeline.prune();
        timeline.sleepers.len()
    }

    /// Move time forward by `duration`, firing every timer that falls due.
    ///
    /// Timers fire in deadline order (registration order for equal
    /// deadlines). The clock reads each timer's deadline while it fires, and
    /// the scheduler yields in between so woken effects can emit actions and
    /// register further timers, which also fire if they land inside the
    /// window.
    pub async fn advance(&self, duration: Duration) {
        settle().await;
        let target = self.timeline().now.saturating_add(duration);

        loop {
            let due = self.timeline().pop_due(target);
            let Some((deadline, waker)) = due else {
                break;
            };
            self.timeline().now = deadline;
            tracing::trace!(?deadline, "Firing virtual timer");
            // The sleeper may have been dropped since pruning
            let _ = waker.send(());
            settle().await;
        }

        self.timeline().now = target;
    }

    /// Move time to `instant` (no-op if it is already past)
    pub async fn advance_to(&self, instant: Duration) {
        let now = self.elapsed();
        self.advance(instant.saturating_sub(now)).await;
    }

    /// Advance until no timers remain
    pub async fn run(&self) {
        settle().await;
        loop {
            let next = {
                let mut timeline = self.timeline();
                timeline.prune();
                timeline
                    .sleepers
                    .first_key_value()
                    .map(|(&(deadline, _), _)| deadline)
            };
            match next {
                Some(deadline) => self.advance_to(deadline).await,
                None => break,
            }
        }
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timeline = self.timeline();
        f.debug_struct("TestScheduler")
            .field("now", &timeline.now)
            .field("sleepers", &timeline.sleepers.len())
            .finish_non_exhaustive()
    }
}

impl Clock for TestScheduler {
    fn now(&self) -> DateTime<Utc> {
        offset_by(self.epoch, self.elapsed())
    }
}

impl Scheduler for TestScheduler {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (waker, wait) = oneshot::channel();
        {
            let mut timeline = self.timeline();
            let key = (timeline.now.saturating_add(duration), timeline.next_seq);
            timeline.next_seq += 1;
            timeline.sleepers.insert(key, waker);
        }

        async move {
            if wait.await.is_err() {
                // Scheduler dropped: virtual time never reaches the deadline
                std::future::pending::<()>().await;
            }
        }
        .boxed()
    }

    fn elapsed(&self) -> Duration {
        self.timeline().now
    }
}

/// Scheduler whose sleeps complete immediately
///
/// For tests that care about what a timed effect emits, not when.
#[derive(Debug, Default)]
pub struct ImmediateScheduler {
    elapsed: Mutex<Duration>,
}

impl ImmediateScheduler {
    /// Create an immediate scheduler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for ImmediateScheduler {
    fn now(&self) -> DateTime<Utc> {
        offset_by(test_clock().now(), self.elapsed())
    }
}

impl Scheduler for ImmediateScheduler {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed = elapsed.saturating_add(duration);
        drop(elapsed);
        futures::future::ready(()).boxed()
    }

    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn offset_by(epoch: DateTime<Utc>, elapsed: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(elapsed)
        .ok()
        .and_then(|offset| epoch.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn settle() {
    for _ in 0..SETTLE_YIELDS {
        tokio::task::yield_now().await;
    }
}
