//! Prometheus metrics for the message pipeline.
//!
//! Covers:
//! - Requests reaching the coordinator, first deliveries and retries
//! - How each request was answered
//! - Handler run time and failures
//! - Notifier outcomes
//! - Registry size and sweeps
//!
//! # Example
//!
//! ```rust,no_run
//! use wechat_bridge_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = MetricsExporter::install()?;
//! if let Some(text) = exporter.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
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

/// Installed Prometheus recorder.
///
/// Rendering is left to the caller, which mounts it on an HTTP route.
#[derive(Clone, Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsExporter {
    /// Describe every metric and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder can only be installed once per process. A second call
    /// succeeds with an exporter that renders nothing.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            // Handler runs range from milliseconds up to the notifier's limit
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 4.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self::default())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "wechat_requests_total",
        "Inbound messages reaching the coordinator, by path (first, retry)"
    );
    describe_counter!(
        "wechat_deliveries_total",
        "How requests were answered (final, transitional, retry_later, acknowledge)"
    );

    describe_histogram!(
        "wechat_handler_duration_seconds",
        "Time taken by message handlers"
    );
    describe_counter!(
        "wechat_handler_failures_total",
        "Handler runs that returned an error or panicked"
    );

    describe_counter!(
        "wechat_notifier_outcomes_total",
        "Notifier exits by outcome"
    );

    describe_gauge!(
        "wechat_registry_entries",
        "Messages currently tracked by the status registry"
    );
    describe_counter!(
        "wechat_registry_swept_total",
        "Completed entries removed by the sweeper"
    );
}

/// Coordinator metrics recorder.
pub struct CoordinatorMetrics;

impl CoordinatorMetrics {
    /// Record a request entering the coordinator.
    pub fn record_request(path: &'static str) {
        counter!("wechat_requests_total", "path" => path).increment(1);
    }

    /// Record how a request was answered.
    pub fn record_delivery(outcome: &'static str) {
        counter!("wechat_deliveries_total", "outcome" => outcome).increment(1);
    }
}

/// Worker metrics recorder.
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Record a finished handler run.
    pub fn record_run(duration: Duration, succeeded: bool) {
        histogram!("wechat_handler_duration_seconds").record(duration.as_secs_f64());
        if !succeeded {
            counter!("wechat_handler_failures_total").increment(1);
        }
    }
}

/// Notifier metrics recorder.
pub struct NotifierMetrics;

impl NotifierMetrics {
    /// Record why a notifier exited.
    pub fn record_outcome(outcome: &'static str) {
        counter!("wechat_notifier_outcomes_total", "outcome" => outcome).increment(1);
    }
}

/// Registry metrics recorder.
pub struct RegistryMetrics;

impl RegistryMetrics {
    /// Record the current number of tracked entries.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_size(entries: usize) {
        gauge!("wechat_registry_entries").set(entries as f64);
    }

    /// Record a sweep pass.
    pub fn record_sweep(removed: usize) {
        counter!("wechat_registry_swept_total").increment(removed as u64);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn recorders_are_callable_without_exporter() {
        CoordinatorMetrics::record_request("first");
        CoordinatorMetrics::record_delivery("final");
        WorkerMetrics::record_run(Duration::from_millis(10), false);
        NotifierMetrics::record_outcome("sent");
        RegistryMetrics::record_size(3);
        RegistryMetrics::record_sweep(1);
    }

    #[test]
    fn install_renders_described_metrics() {
        let exporter = MetricsExporter::install().unwrap();
        CoordinatorMetrics::record_request("first");

        // Another test binary in the same process may have installed the
        // recorder first; then this exporter has nothing to render.
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("wechat_requests_total"));
        }
    }
}
