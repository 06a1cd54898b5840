//! Effect execution inside spawned tasks.
//!
//! The Store schedules the synchronous parts of an effect tree inline and
//! hands everything that suspends to [`execute`], which walks the remaining
//! tree on a tokio task.

use crate::registry::CancellationRegistry;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use unistore_core::{CancelSignal, Effect, Emitter};

/// Everything a running effect needs: where to emit, and where to register
pub(crate) struct ExecContext<A> {
    pub(crate) emitter: Emitter<A>,
    pub(crate) registry: CancellationRegistry,
}

impl<A> Clone for ExecContext<A> {
    fn clone(&self) -> Self {
        Self {
            emitter: self.emitter.clone(),
            registry: self.registry.clone(),
        }
    }
}

/// Whether an effect finishes without ever suspending
pub(crate) fn is_synchronous<A>(effect: &Effect<A>) -> bool {
    match effect {
        Effect::None | Effect::Send(_) | Effect::Cancel(_) => true,
        Effect::Run(_) => false,
        Effect::Merge(children) | Effect::Concatenate(children) => {
            children.iter().all(is_synchronous)
        },
        Effect::Cancellable { effect, .. } => is_synchronous(effect),
    }
}

/// Metric label for an effect
pub(crate) const fn kind<A>(effect: &Effect<A>) -> &'static str {
    match effect {
        Effect::None => "none",
        Effect::Send(_) => "send",
        Effect::Run(_) => "run",
        Effect::Merge(_) => "merge",
        Effect::Concatenate(_) => "concatenate",
        Effect::Cancel(_) => "cancel",
        Effect::Cancellable { .. } => "cancellable",
    }
}

/// Completes when `signal` is set; never completes without one
pub(crate) async fn cancelled_or_pending(signal: Option<CancelSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Run an effect tree to completion.
///
/// - `Merge` children run concurrently on the same task
/// - `Concatenate` children run strictly one after another
/// - `Cancellable` registers its scope when it starts and stops at the next
///   suspension point once its id is cancelled
pub(crate) fn execute<A>(effect: Effect<A>, ctx: ExecContext<A>) -> BoxFuture<'static, ()>
where
    A: Send + 'static,
{
    async move {
        match effect {
            Effect::None => {},
            Effect::Send(action) => {
                ctx.emitter.emit(action);
            },
            Effect::Run(operation) => {
                operation(ctx.emitter.clone()).await;
            },
            Effect::Merge(children) => {
                join_all(children.into_iter().map(|child| execute(child, ctx.clone()))).await;
            },
            Effect::Concatenate(children) => {
                for child in children {
                    if ctx.emitter.is_cancelled() {
                        break;
                    }
                    execute(child, ctx.clone()).await;
                }
            },
            Effect::Cancel(id) => {
                ctx.registry.cancel(&id);
            },
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => {
                if cancel_in_flight {
                    ctx.registry.cancel(&id);
                }
                let registration = ctx.registry.register(id);
                let signal = registration.signal().clone();
                let scoped = ExecContext {
                    emitter: ctx.emitter.with_signal(signal.clone()),
                    registry: ctx.registry.clone(),
                };

                tokio::select! {
                    biased;
                    () = signal.cancelled() => {
                        tracing::trace!(id = ?registration.id(), "Cancellable scope stopped");
                    },
                    () = execute(*effect, scoped) => {},
                }
                drop(registration);
            },
        }
    }
    .boxed()
}
