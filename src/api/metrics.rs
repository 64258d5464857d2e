//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state);

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Sample gauges that are not updated on the hot path
fn update_metrics_from_state(state: &AppState) {
    let pool = state.pool.stats();
    metrics::POOL_QUEUED.set(pool.queued as i64);
    metrics::POOL_IN_FLIGHT.set(pool.in_flight as i64);

    metrics::RATELIMIT_BUCKETS.set(state.rate_limiter.bucket_count() as i64);
}
