//! Effect module - Side effect descriptions
//!
//! Effects describe work to be performed by the runtime. They are values
//! (not execution): building one never starts anything, and the only way its
//! asynchronous work begins is for a Store to schedule it.
//!
//! Effects compose:
//!
//! - [`Effect::merge`] runs children concurrently, with no ordering between
//!   their outputs
//! - [`Effect::concatenate`] runs children strictly one after another
//! - [`Effect::cancellable`] tags an effect with an [`EffectId`] so a later
//!   [`Effect::cancel`] can stop it

use crate::environment::Scheduler;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use crate::emitter::{ActionSink, CancelSignal, Emitter};
pub use crate::id::EffectId;

/// Asynchronous body of a [`Effect::Run`] effect
///
/// Receives the emit-channel handle and resolves when the work is done.
pub type Operation<A> = Box<dyn FnOnce(Emitter<A>) -> BoxFuture<'static, ()> + Send>;

/// Effect type - describes a side effect to be executed
///
/// Effects are NOT executed immediately. They are descriptions of what should
/// happen, returned from reducers and executed by the Store runtime.
///
/// # Type Parameters
///
/// - `Action`: The action type that effects can produce (feedback loop)
pub enum Effect<Action> {
    /// No-op effect
    None,

    /// Feed an action straight back into dispatch
    Send(Action),

    /// Arbitrary async work that may emit any number of actions
    Run(Operation<Action>),

    /// Run effects concurrently
    Merge(Vec<Effect<Action>>),

    /// Run effects strictly in sequence; each child starts only after the
    /// previous one has finished
    Concatenate(Vec<Effect<Action>>),

    /// Cancel every running effect registered under the id
    Cancel(EffectId),

    /// An effect registered under a cancellation id
    Cancellable {
        /// Cancellation group
        id: EffectId,
        /// Cancel whatever is already running under `id` before starting
        cancel_in_flight: bool,
        /// The wrapped effect
        effect: Box<Effect<Action>>,
    },
}

// Manual Debug implementation since operations don't implement Debug
impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Send(action) => f.debug_tuple("Effect::Send").field(action).finish(),
            Effect::Run(_) => write!(f, "Effect::Run(<operation>)"),
            Effect::Merge(effects) => f.debug_tuple("Effect::Merge").field(effects).finish(),
            Effect::Concatenate(effects) => {
                f.debug_tuple("Effect::Concatenate").field(effects).finish()
            },
            Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => f
                .debug_struct("Effect::Cancellable")
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .field("effect", effect)
                .finish(),
        }
    }
}

impl<Action> Default for Effect<Action> {
    fn default() -> Self {
        Self::None
    }
}

impl<Action> Effect<Action> {
    /// An effect that does nothing
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// An effect that immediately feeds `action` back into the Store
    #[must_use]
    pub const fn send(action: Action) -> Self {
        Self::Send(action)
    }

    /// An effect that cancels everything running under `id`
    #[must_use]
    pub fn cancel(id: impl Into<EffectId>) -> Self {
        Self::Cancel(id.into())
    }

    /// Whether this is the no-op effect
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Combine effects to run concurrently
    ///
    /// `None` children are dropped; merging nothing yields `None`.
    #[must_use]
    pub fn merge(effects: impl IntoIterator<Item = Effect<Action>>) -> Self {
        let mut effects: Vec<_> = effects.into_iter().filter(|e| !e.is_none()).collect();
        match effects.len() {
            0 => Self::None,
            1 => effects.remove(0),
            _ => Self::Merge(effects),
        }
    }

    /// Chain effects to run sequentially
    ///
    /// `None` children are dropped; concatenating nothing yields `None`.
    #[must_use]
    pub fn concatenate(effects: impl IntoIterator<Item = Effect<Action>>) -> Self {
        let mut effects: Vec<_> = effects.into_iter().filter(|e| !e.is_none()).collect();
        match effects.len() {
            0 => Self::None,
            1 => effects.remove(0),
            _ => Self::Concatenate(effects),
        }
    }

    /// Run `self` and `other` concurrently
    #[must_use]
    pub fn merge_with(self, other: Self) -> Self {
        Self::merge([self, other])
    }

    /// Run `other` after `self` has finished
    #[must_use]
    pub fn concatenate_with(self, other: Self) -> Self {
        Self::concatenate([self, other])
    }

    /// Register this effect under a cancellation id
    #[must_use]
    pub fn cancellable(self, id: impl Into<EffectId>) -> Self {
        if self.is_none() {
            return Self::None;
        }
        Self::Cancellable {
            id: id.into(),
            cancel_in_flight: false,
            effect: Box::new(self),
        }
    }

    /// Register this effect under a cancellation id, cancelling whatever is
    /// already running under that id first
    #[must_use]
    pub fn cancellable_in_flight(self, id: impl Into<EffectId>) -> Self {
        let id = id.into();
        if self.is_none() {
            return Self::Cancel(id);
        }
        Self::Cancellable {
            id,
            cancel_in_flight: true,
            effect: Box::new(self),
        }
    }
}

impl<Action> Effect<Action>
where
    Action: Send + 'static,
{
    /// Arbitrary async work that emits actions through an [`Emitter`]
    ///
    /// # Example
    ///
    /// ```ignore
    /// Effect::run(move |emitter| async move {
    ///     let result = env.api.load(id).await;
    ///     emitter.emit(Action::Loaded(result.map_err(|e| e.to_string())));
    /// })
    /// ```
    #[must_use]
    pub fn run<F, Fut>(operation: F) -> Self
    where
        F: FnOnce(Emitter<Action>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Run(Box::new(move |emitter| operation(emitter).boxed()))
    }

    /// Async computation producing at most one action
    #[must_use]
    pub fn future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Option<Action>> + Send + 'static,
    {
        Self::run(move |emitter| async move {
            if let Some(action) = future.await {
                emitter.emit(action);
            }
        })
    }

    /// Fallible async computation whose failure becomes a response action
    ///
    /// Errors never escape the effect: `on_error` turns them into an action
    /// that flows through the same dispatch path as a success.
    #[must_use]
    pub fn try_future<Fut, Err, F>(future: Fut, on_error: F) -> Self
    where
        Fut: Future<Output = Result<Action, Err>> + Send + 'static,
        Err: Send + 'static,
        F: FnOnce(Err) -> Action + Send + 'static,
    {
        Self::run(move |emitter| async move {
            let action = match future.await {
                Ok(action) => action,
                Err(error) => on_error(error),
            };
            emitter.emit(action);
        })
    }

    /// Emit every item of a stream, in order
    #[must_use]
    pub fn stream<St>(stream: St) -> Self
    where
        St: Stream<Item = Action> + Send + 'static,
    {
        Self::run(move |emitter| async move {
            let mut stream = Box::pin(stream);
            while let Some(action) = stream.next().await {
                if !emitter.emit(action) {
                    break;
                }
            }
        })
    }

    /// Emit `action` once `duration` has elapsed on `scheduler`
    #[must_use]
    pub fn delay<S>(scheduler: &Arc<S>, duration: Duration, action: Action) -> Self
    where
        S: Scheduler + ?Sized + 'static,
    {
        let scheduler = Arc::clone(scheduler);
        Self::run(move |emitter| async move {
            scheduler.sleep(duration).await;
            emitter.emit(action);
        })
    }

    /// Wait `duration` before running this effect, restarting the wait
    /// whenever another debounced effect with the same id is scheduled
    #[must_use]
    pub fn debounce<S>(self, id: impl Into<EffectId>, duration: Duration, scheduler: &Arc<S>) -> Self
    where
        S: Scheduler + ?Sized + 'static,
    {
        let scheduler = Arc::clone(scheduler);
        let wait = Self::run(move |_emitter| async move {
            scheduler.sleep(duration).await;
        });
        Self::Concatenate(vec![wait, self]).cancellable_in_flight(id)
    }

    /// Transform the actions this effect produces
    ///
    /// Used to lift a child feature's effects into a parent action type.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Send + 'static,
        F: Fn(Action) -> B + Send + Sync + 'static,
    {
        self.map_shared(Arc::new(f))
    }

    fn map_shared<B>(self, f: Arc<dyn Fn(Action) -> B + Send + Sync>) -> Effect<B>
    where
        B: Send + 'static,
    {
        match self {
            Self::None => Effect::None,
            Self::Send(action) => Effect::Send(f(action)),
            Self::Run(operation) => Effect::Run(Box::new(move |emitter: Emitter<B>| {
                operation(emitter.contramap(f))
            })),
            Self::Merge(effects) => Effect::Merge(
                effects
                    .into_iter()
                    .map(|e| e.map_shared(Arc::clone(&f)))
                    .collect(),
            ),
            Self::Concatenate(effects) => Effect::Concatenate(
                effects
                    .into_iter()
                    .map(|e| e.map_shared(Arc::clone(&f)))
                    .collect(),
            ),
            Self::Cancel(id) => Effect::Cancel(id),
            Self::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => Effect::Cancellable {
                id,
                cancel_in_flight,
                effect: Box::new(effect.map_shared(f)),
            },
        }
    }
}
