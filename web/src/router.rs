//! Route table and HTTP layers.

use axum::{
    Router,
    extract::Request,
    http::HeaderName,
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{health_check, metrics, readiness_check, receive_message, verify_url};
use crate::state::AppState;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router.
///
/// ```text
/// GET  /wechat         URL verification
/// POST /wechat         inbound messages
/// GET  /health         liveness
/// GET  /health/ready   readiness
/// GET  /metrics        Prometheus exposition
/// ```
///
/// Every request gets an `x-request-id` (kept if the caller sent one),
/// recorded on its tracing span and echoed on the response.
pub fn build_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/wechat", get(verify_url).post(receive_message))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    let request_id = request
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
}
