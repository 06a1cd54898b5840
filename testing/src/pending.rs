//! Pending Action Queue: effect output waiting to be asserted.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use unistore_core::ActionSink;

/// FIFO of actions produced by effects but not yet received by a test
///
/// Effects append from any task; the test consumes from the head. A
/// consumer waiting on an empty queue suspends until the next delivery.
#[derive(Debug)]
pub struct PendingActions<A> {
    queue: Mutex<VecDeque<A>>,
    arrived: Notify,
}

impl<A> PendingActions<A> {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<A>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an action
    pub fn push(&self, action: A) {
        self.lock().push_back(action);
        self.arrived.notify_one();
    }

    /// Take the head without waiting
    pub fn try_pop(&self) -> Option<A> {
        self.lock().pop_front()
    }

    /// Take the head, waiting up to `timeout` for one to arrive
    ///
    /// Returns `None` if the queue stayed empty for the whole window.
    pub async fn pop(&self, timeout: Duration) -> Option<A> {
        tokio::time::timeout(timeout, async {
            loop {
                if let Some(action) = self.try_pop() {
                    return action;
                }
                // `notify_one` stores a permit, so a push between the check
                // and this await is not lost
                self.arrived.notified().await;
            }
        })
        .await
        .ok()
    }

    /// Remove and return everything queued
    pub fn drain(&self) -> Vec<A> {
        self.lock().drain(..).collect()
    }

    /// Number of queued actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the queued actions, head first
    #[must_use]
    pub fn snapshot(&self) -> Vec<A>
    where
        A: Clone,
    {
        self.lock().iter().cloned().collect()
    }
}

impl<A> Default for PendingActions<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Send> ActionSink<A> for PendingActions<A> {
    fn deliver(&self, action: A) -> bool {
        self.push(action);
        true
    }
}
