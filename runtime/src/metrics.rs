//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the runtime:
//! - Action dispatch and reducer timing
//! - Effect scheduling and in-flight tasks
//! - Cancellation
//!
//! Recording is a no-op until a recorder is installed, so stores used in
//! tests pay nothing for it.
//!
//! # Example
//!
//! ```rust,no_run
//! use unistore_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and renders the Prometheus text format for
/// whatever serves the scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint is advertised on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// logs a warning and leaves [`handle`](Self::handle) empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - scrape at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "store_actions_processed_total",
        "Total number of actions reduced by stores"
    );
    describe_counter!(
        "store_actions_rejected_total",
        "Total number of actions rejected because the store was shutting down"
    );
    describe_histogram!(
        "store_reducer_duration_seconds",
        "Time taken to run the reducer for one action"
    );
    describe_counter!(
        "store_effects_scheduled_total",
        "Total number of effects scheduled, by kind"
    );
    describe_gauge!(
        "store_effects_in_flight",
        "Number of effect tasks currently running"
    );
    describe_counter!(
        "store_effects_cancelled_total",
        "Total number of effect tasks cancelled"
    );
}

/// Store dispatch metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action reduced.
    pub fn record_action(duration: Duration) {
        counter!("store_actions_processed_total").increment(1);
        histogram!("store_reducer_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an action rejected during shutdown.
    pub fn record_rejected() {
        counter!("store_actions_rejected_total").increment(1);
    }
}

/// Effect scheduling metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record an effect scheduled.
    ///
    /// `kind` is one of `send`, `run`, `merge`, `concatenate`, `cancel`,
    /// `cancellable`.
    pub fn record_scheduled(kind: &'static str) {
        counter!("store_effects_scheduled_total", "kind" => kind).increment(1);
    }

    /// Record an effect task started.
    pub fn record_task_started() {
        gauge!("store_effects_in_flight").increment(1.0);
    }

    /// Record an effect task finished, cancelled or torn down.
    pub fn record_task_finished() {
        gauge!("store_effects_in_flight").decrement(1.0);
    }
}

/// Cancellation metrics recorder.
pub struct CancellationMetrics;

impl CancellationMetrics {
    /// Record tasks cancelled.
    pub fn record_cancelled(count: usize) {
        counter!("store_effects_cancelled_total").increment(count as u64);
    }
}
