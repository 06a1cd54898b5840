//! Emit-channel handle and cooperative cancellation signal.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Destination for actions emitted by running effects
///
/// The Store's run queue implements this in production; the test harness
/// implements it with its pending-action queue.
pub trait ActionSink<A>: Send + Sync {
    /// Hand an action to the destination.
    ///
    /// Returns `false` if the destination no longer accepts actions.
    fn deliver(&self, action: A) -> bool;
}

/// Cooperative cancellation flag
///
/// Cloning yields another handle to the same flag. Setting it is sticky:
/// once cancelled, a signal never resets.
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    /// Create a signal that has not been cancelled
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the signal.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Whether the signal has been set
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once the signal is set (immediately if it already is)
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Explicit emit-channel handle passed to every running effect body
///
/// Effect bodies never close over the Store. They receive an `Emitter` and
/// push actions through it; every emission funnels into the single dispatch
/// entry point of the Store that scheduled the effect.
///
/// An emitter is bound to the cancellation signals of every cancellable
/// scope it runs under. Once any of them is set, further emissions are
/// dropped. Actions emitted before that moment are delivered normally.
///
/// # Example
///
/// ```ignore
/// Effect::run(|emitter| async move {
///     for page in 1..=3 {
///         let rows = api.fetch(page).await;
///         if !emitter.emit(Action::PageLoaded { page, rows }) {
///             break;
///         }
///     }
/// })
/// ```
pub struct Emitter<A> {
    sink: Arc<dyn ActionSink<A>>,
    signals: Vec<CancelSignal>,
}

impl<A> Emitter<A> {
    /// Create an emitter that forwards into `sink`
    #[must_use]
    pub fn new(sink: Arc<dyn ActionSink<A>>) -> Self {
        Self {
            sink,
            signals: Vec::new(),
        }
    }

    /// Derive an emitter that is additionally bound to `signal`
    #[must_use]
    pub fn with_signal(&self, signal: CancelSignal) -> Self {
        let mut signals = self.signals.clone();
        signals.push(signal);
        Self {
            sink: Arc::clone(&self.sink),
            signals,
        }
    }

    /// Whether any enclosing cancellable scope has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signals.iter().any(CancelSignal::is_cancelled)
    }

    /// Send an action back into the Store.
    ///
    /// Returns `false` if the action was dropped, either because the
    /// effect was cancelled before this call or because the destination has
    /// shut down.
    pub fn emit(&self, action: A) -> bool {
        if self.is_cancelled() {
            tracing::debug!("Dropping emission from cancelled effect");
            return false;
        }
        self.sink.deliver(action)
    }

    /// Completes once any enclosing cancellable scope is cancelled.
    ///
    /// Never completes for an emitter with no cancellable scope.
    pub async fn cancelled(&self) {
        if self.signals.is_empty() {
            std::future::pending::<()>().await;
        }
        let waits = self
            .signals
            .iter()
            .map(|signal| Box::pin(signal.cancelled()));
        futures::future::select_all(waits).await;
    }

    /// Derive an emitter for a child action type, embedding each child
    /// action with `embed` before delivery.
    #[must_use]
    pub fn contramap<B>(&self, embed: Arc<dyn Fn(B) -> A + Send + Sync>) -> Emitter<B>
    where
        A: 'static,
        B: 'static,
    {
        Emitter {
            sink: Arc::new(EmbedSink {
                inner: Arc::clone(&self.sink),
                embed,
            }),
            signals: self.signals.clone(),
        }
    }
}

impl<A> Clone for Emitter<A> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            signals: self.signals.clone(),
        }
    }
}

impl<A> fmt::Debug for Emitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("scopes", &self.signals.len())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

struct EmbedSink<A, B> {
    inner: Arc<dyn ActionSink<A>>,
    embed: Arc<dyn Fn(B) -> A + Send + Sync>,
}

impl<A, B> ActionSink<B> for EmbedSink<A, B> {
    fn deliver(&self, action: B) -> bool {
        self.inner.deliver((self.embed)(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_test::{assert_pending, assert_ready, task};

    #[derive(Default)]
    struct Collect(Mutex<Vec<i32>>);

    impl ActionSink<i32> for Collect {
        fn deliver(&self, action: i32) -> bool {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(action);
            true
        }
    }

    impl Collect {
        fn taken(&self) -> Vec<i32> {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    #[test]
    fn test_cancel_is_sticky_and_reports_transition() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        assert!(signal.cancel());
        assert!(!signal.cancel());
        assert!(signal.clone().is_cancelled());
    }

    #[test]
    fn test_cancelled_future_wakes_on_cancel() {
        let signal = CancelSignal::new();
        let mut waiting = task::spawn(signal.cancelled());
        assert_pending!(waiting.poll());

        signal.cancel();
        assert!(waiting.is_woken());
        assert_ready!(waiting.poll());
    }

    #[test]
    fn test_emissions_after_cancel_are_dropped() {
        let sink = Arc::new(Collect::default());
        let signal = CancelSignal::new();
        let emitter = Emitter::new(sink.clone() as Arc<dyn ActionSink<i32>>).with_signal(signal.clone());

        assert!(emitter.emit(1));
        signal.cancel();
        assert!(!emitter.emit(2));

        assert_eq!(sink.taken(), vec![1]);
    }

    #[test]
    fn test_nested_scope_observes_outer_signal() {
        let sink = Arc::new(Collect::default());
        let outer = CancelSignal::new();
        let emitter = Emitter::new(sink.clone() as Arc<dyn ActionSink<i32>>)
            .with_signal(outer.clone())
            .with_signal(CancelSignal::new());

        outer.cancel();
        assert!(emitter.is_cancelled());
        assert!(!emitter.emit(5));
        assert!(sink.taken().is_empty());
    }

    #[test]
    fn test_contramap_embeds_child_actions() {
        let sink = Arc::new(Collect::default());
        let emitter = Emitter::new(sink.clone() as Arc<dyn ActionSink<i32>>);
        let child: Emitter<&'static str> = emitter.contramap(Arc::new(|s: &str| {
            i32::try_from(s.len()).unwrap_or(i32::MAX)
        }));

        assert!(child.emit("four"));
        assert_eq!(sink.taken(), vec![4]);
    }
}
