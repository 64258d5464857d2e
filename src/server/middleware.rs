use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::metrics::HttpMetrics;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// API Key authentication middleware
/// Validates X-API-Key header against configured api.key
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    // No key configured: open access (development)
    let Some(expected_key) = &state.settings.api.key else {
        return Ok(next.run(req).await);
    };

    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match api_key {
        Some(key) if key == expected_key => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Invalid API key provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "Missing API key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Records request count and latency per method and status
pub async fn http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let started = Instant::now();

    let response = next.run(req).await;
    HttpMetrics::record_request(method.as_str(), response.status().as_u16(), started.elapsed());

    response
}
