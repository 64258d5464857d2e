//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    DELIVERY_ATTEMPTS_TOTAL, DELIVERY_CALLBACKS_TOTAL, DELIVERY_LATENCY, DELIVERY_RETRIES_TOTAL,
    DISPATCH_TOTAL, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_LATENCY, NOTIFICATIONS_TOTAL,
    POOL_IN_FLIGHT, POOL_QUEUED, POOL_REJECTED_TOTAL, RATELIMIT_DENIED_TOTAL,
    RENDER_ERRORS_TOTAL, RETENTION_PURGED_TOTAL, TEMPLATES_SEEDED_TOTAL,
    TEMPLATE_RESOLUTIONS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_attempt(channel: &str, attempt: u32) {
        DELIVERY_ATTEMPTS_TOTAL.with_label_values(&[channel]).inc();
        if attempt > 1 {
            DELIVERY_RETRIES_TOTAL.with_label_values(&[channel]).inc();
        }
    }

    /// Record the final outcome of a send and its latency
    pub fn record_outcome(channel: &str, outcome: &str, elapsed: Duration) {
        NOTIFICATIONS_TOTAL
            .with_label_values(&[channel, outcome])
            .inc();
        DELIVERY_LATENCY
            .with_label_values(&[channel])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_callback(status: &str) {
        DELIVERY_CALLBACKS_TOTAL.with_label_values(&[status]).inc();
    }
}

/// Helper struct for recording dispatch and worker pool metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record(tier: &str, outcome: &str) {
        DISPATCH_TOTAL.with_label_values(&[tier, outcome]).inc();
    }

    pub fn record_rejected(tier: &str) {
        POOL_REJECTED_TOTAL.with_label_values(&[tier]).inc();
        DISPATCH_TOTAL.with_label_values(&[tier, "rejected"]).inc();
    }

    pub fn job_queued() {
        POOL_QUEUED.inc();
    }

    pub fn job_started() {
        POOL_QUEUED.dec();
        POOL_IN_FLIGHT.inc();
    }

    pub fn job_finished() {
        POOL_IN_FLIGHT.dec();
    }
}

/// Helper struct for recording template metrics
pub struct TemplateMetrics;

impl TemplateMetrics {
    /// `outcome` is one of `exact`, `fallback`, `not_found`
    pub fn record_resolution(outcome: &str) {
        TEMPLATE_RESOLUTIONS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_seeded(count: u64) {
        TEMPLATES_SEEDED_TOTAL.inc_by(count);
    }

    pub fn record_render_error() {
        RENDER_ERRORS_TOTAL.inc();
    }
}

/// Helper struct for recording rate limit metrics
pub struct RateLimitMetrics;

impl RateLimitMetrics {
    pub fn record_denied(channel: &str) {
        RATELIMIT_DENIED_TOTAL.with_label_values(&[channel]).inc();
    }
}

/// Helper struct for recording retention metrics
pub struct RetentionMetrics;

impl RetentionMetrics {
    pub fn record_purged(count: u64) {
        RETENTION_PURGED_TOTAL.inc_by(count);
    }
}

/// Helper struct for recording HTTP API metrics
pub struct HttpMetrics;

impl HttpMetrics {
    pub fn record_request(method: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[method, status.as_str()])
            .inc();
        HTTP_REQUEST_LATENCY
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_metrics() {
        DeliveryMetrics::record_attempt("email", 1);
        DeliveryMetrics::record_attempt("email", 2);
        DeliveryMetrics::record_outcome("email", "sent", Duration::from_millis(12));
        DeliveryMetrics::record_callback("delivered");
        // Just verify no panics
    }

    #[test]
    fn test_dispatch_metrics() {
        DispatchMetrics::record("high", "dispatched");
        DispatchMetrics::record_rejected("low");
        DispatchMetrics::job_queued();
        DispatchMetrics::job_started();
        DispatchMetrics::job_finished();
        // Just verify no panics
    }

    #[test]
    fn test_template_and_http_metrics() {
        TemplateMetrics::record_resolution("fallback");
        TemplateMetrics::record_seeded(4);
        TemplateMetrics::record_render_error();
        RateLimitMetrics::record_denied("sms");
        RetentionMetrics::record_purged(2);
        HttpMetrics::record_request("GET", 200, Duration::from_millis(3));
        // Just verify no panics
    }
}
