//! Counter example binary
//!
//! Drives the counter through a production Store on the tokio timer.

use anyhow::Context;
use counter::{CounterAction, CounterEnvironment, CounterReducer, CounterState, TICK_INTERVAL};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unistore_runtime::metrics::MetricsServer;
use unistore_runtime::{Store, StoreConfig, TokioScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=info,unistore_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_addr = std::env::var("COUNTER_METRICS_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:9090".to_string())
        .parse()
        .context("COUNTER_METRICS_ADDR is not a socket address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start()?;

    let config = StoreConfig::from_env().context("invalid UNISTORE_* configuration")?;

    println!("=== Counter Example: Unistore Architecture ===\n");

    let env = CounterEnvironment::new(TokioScheduler::new());
    let store = Store::with_config(CounterState::default(), CounterReducer::new(), env, config);

    // Request/response: wait for the Changed action the increment produces
    println!(">>> Sending: Increment");
    let changed = store
        .send_and_wait_for(
            CounterAction::Increment,
            |a| matches!(a, CounterAction::Changed { .. }),
            Duration::from_secs(1),
        )
        .await?;
    println!("Observed: {changed:?}");

    println!("\n>>> Sending: Burst(5)");
    let mut handle = store.send(CounterAction::Burst(5)).await?;
    handle.wait_with_timeout(Duration::from_secs(1)).await?;
    store.wait_for_idle(Duration::from_secs(1)).await?;
    println!("Count after burst: {}", store.state(|s| s.count));

    println!("\n>>> Sending: StartTimer, letting it tick three times");
    store.send(CounterAction::StartTimer).await?;
    tokio::time::sleep(TICK_INTERVAL * 3 + TICK_INTERVAL / 2).await;
    store.send(CounterAction::StopTimer).await?;
    println!("Count after timer: {}", store.state(|s| s.count));

    println!("\n>>> Sending: RequestFact");
    let fact = store
        .send_and_wait_for(
            CounterAction::RequestFact,
            |a| matches!(a, CounterAction::FactLoaded(_) | CounterAction::FactFailed(_)),
            Duration::from_secs(2),
        )
        .await?;
    println!("Fact lookup finished: {fact:?}");

    println!("\n>>> Sending: Countdown {{ from: 3 }}");
    store
        .send_and_wait_for(
            CounterAction::Countdown { from: 3 },
            |a| matches!(a, CounterAction::CountdownFinished),
            Duration::from_secs(5),
        )
        .await?;
    println!("Countdown finished");

    println!("\n>>> Sending: Reset");
    store.send(CounterAction::Reset).await?;
    println!("State after reset: {:?}", store.state(Clone::clone));

    store.shutdown_default().await?;

    if let Some(text) = metrics.render() {
        println!("\n=== Metrics ===\n{text}");
    }

    println!("\n=== Architecture Demonstration Complete ===");
    println!("\nKey concepts demonstrated:");
    println!("  • State: CounterState (domain data)");
    println!("  • Action: CounterAction (intents and effect responses)");
    println!("  • Reducer: (state, action) → effect");
    println!("  • Effects: future, merge, concatenate, delay, debounce, cancellable timers");
    println!("  • Environment: Injected Scheduler (tokio here, virtual time in tests)");
    Ok(())
}
