//! Application state for Axum handlers.

use std::sync::Arc;

use wechat_bridge_core::environment::Clock;
use wechat_bridge_core::handlers::HandlerRegistry;
use wechat_bridge_core::{EndpointSettings, Session};
use wechat_bridge_runtime::metrics::MetricsExporter;
use wechat_bridge_runtime::{MessageStatusRegistry, RetryCoordinator};

/// Application state shared across all HTTP handlers.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct AppState {
    /// Endpoint credentials and reply texts
    pub settings: Arc<EndpointSettings>,
    /// Delivery coordination
    pub coordinator: RetryCoordinator,
    /// Handler per message type
    pub handlers: Arc<HandlerRegistry>,
    /// Chat backend and conversation storage
    pub session: Session,
    /// Time source for reply timestamps
    pub clock: Arc<dyn Clock>,
    /// Prometheus exporter backing `/metrics`
    pub metrics: MetricsExporter,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("coordinator", &self.coordinator)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new application state without a metrics exporter.
    #[must_use]
    pub fn new(
        settings: EndpointSettings,
        coordinator: RetryCoordinator,
        handlers: HandlerRegistry,
        session: Session,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            coordinator,
            handlers: Arc::new(handlers),
            session,
            clock,
            metrics: MetricsExporter::default(),
        }
    }

    /// Attach the exporter rendered on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsExporter) -> Self {
        self.metrics = metrics;
        self
    }

    /// The shared message registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<MessageStatusRegistry> {
        self.coordinator.registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
