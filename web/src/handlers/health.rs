//! Health and metrics endpoints.

use axum::{Json, extract::State, http::StatusCode};
use wechat_bridge_runtime::{HealthCheck, HealthReport, HealthStatus};

use crate::state::AppState;

/// Liveness.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness, with the number of tracked messages.
///
/// Missing push credentials report as degraded: slow answers can then only
/// be delivered through platform retries.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// ```text
/// GET /health/ready
/// ```
#[allow(clippy::unused_async)]
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let mut checks = vec![HealthCheck::registry(state.registry())];
    if state.settings.push_credentials().is_none() {
        checks.push(HealthCheck::degraded(
            "push",
            "app_id/app_secret not configured",
        ));
    }
    let report = HealthReport::new(checks, state.clock.now());

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

/// Prometheus exposition.
///
/// ```text
/// GET /metrics
/// ```
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics.render() {
        Some(text) => (StatusCode::OK, text),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_is_ok() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
