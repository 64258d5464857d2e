//! Prometheus metrics for the dispatch service.
//!
//! - Delivery metrics (sends by outcome, attempts, retries, latency)
//! - Dispatch metrics (events by tier, worker pool backpressure)
//! - Template resolution metrics
//! - Rate limiting and retention metrics
//! - HTTP API metrics

mod helpers;

pub use helpers::{
    encode_metrics, DeliveryMetrics, DispatchMetrics, HttpMetrics, RateLimitMetrics,
    RetentionMetrics, TemplateMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_dispatch";

lazy_static! {
    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Finished sends by channel and outcome
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_total", METRIC_PREFIX),
        "Total notifications by channel and final outcome",
        &["channel", "outcome"]
    ).unwrap();

    /// Provider hand-off attempts
    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_attempts_total", METRIC_PREFIX),
        "Total provider hand-off attempts",
        &["channel"]
    ).unwrap();

    /// Attempts after the first one
    pub static ref DELIVERY_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_retries_total", METRIC_PREFIX),
        "Total delivery retries",
        &["channel"]
    ).unwrap();

    /// Time from send request to final outcome
    pub static ref DELIVERY_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_delivery_latency_seconds", METRIC_PREFIX),
        "Delivery latency in seconds",
        &["channel"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Delivery status callbacks applied (delivered, bounced)
    pub static ref DELIVERY_CALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_callbacks_total", METRIC_PREFIX),
        "Total provider status updates applied",
        &["status"]
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Dispatched events by tier and outcome
    pub static ref DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_total", METRIC_PREFIX),
        "Total dispatched events by tier and outcome",
        &["tier", "outcome"]
    ).unwrap();

    /// Detached jobs rejected because the worker queue was full
    pub static ref POOL_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pool_rejected_total", METRIC_PREFIX),
        "Total detached jobs rejected by the worker pool",
        &["tier"]
    ).unwrap();

    /// Detached jobs waiting in the worker queue
    pub static ref POOL_QUEUED: IntGauge = register_int_gauge!(
        format!("{}_pool_queued", METRIC_PREFIX),
        "Detached jobs waiting for a worker"
    ).unwrap();

    /// Detached jobs currently running
    pub static ref POOL_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_pool_in_flight", METRIC_PREFIX),
        "Detached jobs currently running"
    ).unwrap();

    // ============================================================================
    // Template Metrics
    // ============================================================================

    /// Template resolutions by outcome
    pub static ref TEMPLATE_RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_template_resolutions_total", METRIC_PREFIX),
        "Template resolutions by outcome",
        &["outcome"]
    ).unwrap();

    /// Default templates written by lazy seeding
    pub static ref TEMPLATES_SEEDED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_templates_seeded_total", METRIC_PREFIX),
        "Total default templates seeded"
    ).unwrap();

    /// Render failures
    pub static ref RENDER_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_render_errors_total", METRIC_PREFIX),
        "Total template render failures"
    ).unwrap();

    // ============================================================================
    // Rate Limit / Retention Metrics
    // ============================================================================

    /// Sends denied by the rate limiter
    pub static ref RATELIMIT_DENIED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_ratelimit_denied_total", METRIC_PREFIX),
        "Total sends denied by rate limiting",
        &["channel"]
    ).unwrap();

    /// Live token buckets, sampled on scrape
    pub static ref RATELIMIT_BUCKETS: IntGauge = register_int_gauge!(
        format!("{}_ratelimit_buckets", METRIC_PREFIX),
        "Number of live rate limit buckets"
    ).unwrap();

    /// Notification records removed by the retention task
    pub static ref RETENTION_PURGED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_retention_purged_total", METRIC_PREFIX),
        "Total notification records purged by retention"
    ).unwrap();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// HTTP requests by method and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_http_requests_total", METRIC_PREFIX),
        "Total HTTP API requests",
        &["method", "status"]
    ).unwrap();

    /// HTTP request latency
    pub static ref HTTP_REQUEST_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_http_request_latency_seconds", METRIC_PREFIX),
        "HTTP API request latency in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        // lazy_static requires first access
        TEMPLATES_SEEDED_TOTAL.inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("ara_dispatch_templates_seeded_total"));
    }

    #[test]
    fn test_pool_gauges() {
        POOL_QUEUED.set(3);
        POOL_IN_FLIGHT.inc();
        POOL_IN_FLIGHT.dec();
        // Just verify no panics
    }
}
