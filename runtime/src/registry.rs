//! Cancellation registry.
//!
//! Maps each [`EffectId`] to the set of live tasks running under it. A task
//! registers when it is scheduled and deregisters when its [`Registration`]
//! drops, so a finished effect never lingers in the map.
//!
//! The registry has its own lock, separate from the State lock. It is only
//! ever held for map bookkeeping; cancellation signals are fired after the
//! entry has been removed.

use crate::metrics::CancellationMetrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use unistore_core::{CancelSignal, EffectId};

#[derive(Default)]
struct Inner {
    next_key: u64,
    entries: HashMap<EffectId, HashMap<u64, CancelSignal>>,
}

/// Cancellation registry keyed by effect id
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl CancellationRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new task under `id`.
    ///
    /// The task stays registered until the returned [`Registration`] is
    /// dropped or the id is cancelled.
    #[must_use = "dropping the registration deregisters the task immediately"]
    pub fn register(&self, id: EffectId) -> Registration {
        let signal = CancelSignal::new();
        let key = {
            let mut inner = self.lock();
            let key = inner.next_key;
            inner.next_key += 1;
            inner
                .entries
                .entry(id.clone())
                .or_default()
                .insert(key, signal.clone());
            key
        };
        tracing::trace!(?id, key, "Registered cancellable effect");

        Registration {
            registry: self.clone(),
            id,
            key,
            signal,
        }
    }

    /// Cancel every task registered under `id`.
    ///
    /// Returns the number of tasks signalled. Cancelling an id with nothing
    /// registered is a no-op.
    pub fn cancel(&self, id: &EffectId) -> usize {
        let signals = self.lock().entries.remove(id);
        let Some(signals) = signals else {
            tracing::trace!(?id, "Cancel requested for idle id");
            return 0;
        };

        let count = signals.len();
        for signal in signals.into_values() {
            signal.cancel();
        }
        tracing::debug!(?id, count, "Cancelled effects");
        CancellationMetrics::record_cancelled(count);
        count
    }

    /// Cancel every registered task, whatever its id.
    ///
    /// Returns the number of tasks signalled.
    pub fn cancel_all(&self) -> usize {
        let entries = std::mem::take(&mut self.lock().entries);
        let count = entries.values().map(HashMap::len).sum();
        for signal in entries.into_values().flat_map(HashMap::into_values) {
            signal.cancel();
        }
        if count > 0 {
            tracing::debug!(count, "Cancelled all registered effects");
            CancellationMetrics::record_cancelled(count);
        }
        count
    }

    /// Whether `id` has at least one live task
    #[must_use]
    pub fn contains(&self, id: &EffectId) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// Number of live registered tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.values().map(HashMap::len).sum()
    }

    /// Whether no task is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Ids with at least one live task
    #[must_use]
    pub fn ids(&self) -> Vec<EffectId> {
        self.lock().entries.keys().cloned().collect()
    }

    fn deregister(&self, id: &EffectId, key: u64) {
        let mut inner = self.lock();
        if let Some(tasks) = inner.entries.get_mut(id) {
            tasks.remove(&key);
            if tasks.is_empty() {
                inner.entries.remove(id);
            }
        }
    }
}

impl std::fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

/// A task's membership in the registry
///
/// Dropping it removes the task from its id's set.
pub struct Registration {
    registry: CancellationRegistry,
    id: EffectId,
    key: u64,
    signal: CancelSignal,
}

impl Registration {
    /// The id the task is registered under
    #[must_use]
    pub const fn id(&self) -> &EffectId {
        &self.id
    }

    /// The signal set when the task is cancelled
    #[must_use]
    pub const fn signal(&self) -> &CancelSignal {
        &self.signal
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(&self.id, self.key);
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("cancelled", &self.signal.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_signals_every_task_under_id() {
        let registry = CancellationRegistry::new();
        let first = registry.register(EffectId::from("timer"));
        let second = registry.register(EffectId::from("timer"));
        let other = registry.register(EffectId::from("search"));
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.cancel(&EffectId::from("timer")), 2);

        assert!(first.signal().is_cancelled());
        assert!(second.signal().is_cancelled());
        assert!(!other.signal().is_cancelled());
        assert!(!registry.contains(&EffectId::from("timer")));
        assert_eq!(registry.ids(), vec![EffectId::from("search")]);
    }

    #[test]
    fn test_cancel_idle_id_is_noop() {
        let registry = CancellationRegistry::new();
        assert_eq!(registry.cancel(&EffectId::from("nothing")), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_deregisters_only_own_task() {
        let registry = CancellationRegistry::new();
        let first = registry.register(EffectId::from("job"));
        let second = registry.register(EffectId::from("job"));

        drop(first);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&EffectId::from("job")));

        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_after_cancel_leaves_new_registrations_alone() {
        let registry = CancellationRegistry::new();
        let stale = registry.register(EffectId::from("job"));
        registry.cancel(&EffectId::from("job"));

        let fresh = registry.register(EffectId::from("job"));
        drop(stale);

        assert!(registry.contains(&EffectId::from("job")));
        assert!(!fresh.signal().is_cancelled());
    }

    #[test]
    fn test_cancel_all() {
        let registry = CancellationRegistry::new();
        let a = registry.register(EffectId::from("a"));
        let b = registry.register(EffectId::new(2_u64));

        assert_eq!(registry.cancel_all(), 2);
        assert!(registry.is_empty());
        assert!(a.signal().is_cancelled());
        assert!(b.signal().is_cancelled());
    }
}
