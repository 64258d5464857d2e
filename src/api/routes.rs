use axum::{
    routing::{get, post, put},
    Router,
};

use crate::server::AppState;

use super::events::{dispatch_event, set_auto_send};
use super::health::health;
use super::metrics::prometheus_metrics;
use super::notification::{get_notification, list_notifications, refresh_status, update_status};
use super::provider::{delete_provider, get_provider, put_provider, test_provider};
use super::template::{
    create_template, delete_template, get_template, list_templates, preview_template,
    reset_template, update_template,
};

/// Routes that stay reachable without an API key
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
}

/// Tenant-scoped API
pub fn api_routes() -> Router<AppState> {
    Router::new().nest(
        "/api/v1/tenants/{tenant}",
        Router::new()
            // Templates
            .route("/templates", get(list_templates).post(create_template))
            .route(
                "/templates/{id}",
                get(get_template)
                    .put(update_template)
                    .delete(delete_template),
            )
            .route("/templates/{id}/preview", post(preview_template))
            .route("/templates/{id}/reset", post(reset_template))
            // Notifications
            .route("/notifications", get(list_notifications))
            .route("/notifications/{id}", get(get_notification))
            .route("/notifications/{id}/status", post(update_status))
            .route("/notifications/{id}/refresh", post(refresh_status))
            // Providers
            .route(
                "/providers/{channel}",
                get(get_provider).put(put_provider).delete(delete_provider),
            )
            .route("/providers/{channel}/test", post(test_provider))
            // Events
            .route("/events", post(dispatch_event))
            .route("/auto-send/{event}", put(set_auto_send)),
    )
}
