//! Notification history and delivery status endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::notification::{Notification, NotificationFilter, NotificationStatus, Page};
use crate::error::{AppError, Result};
use crate::server::AppState;

use super::tenant;

/// Provider callback body
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: NotificationStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// GET /api/v1/tenants/{tenant}/notifications
#[tracing::instrument(name = "http.list_notifications", skip(state))]
pub async fn list_notifications(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(filter): Query<NotificationFilter>,
) -> Result<Json<Page<Notification>>> {
    let tenant = tenant(tenant_id)?;
    Ok(Json(state.delivery.list(tenant.as_str(), &filter).await?))
}

/// GET /api/v1/tenants/{tenant}/notifications/{id}
#[tracing::instrument(name = "http.get_notification", skip(state))]
pub async fn get_notification(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
) -> Result<Json<Notification>> {
    let tenant = tenant(tenant_id)?;
    Ok(Json(state.delivery.get(tenant.as_str(), id).await?))
}

/// POST /api/v1/tenants/{tenant}/notifications/{id}/status
#[tracing::instrument(name = "http.update_notification_status", skip(state, request), fields(status = %request.status))]
pub async fn update_status(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Notification>> {
    let tenant = tenant(tenant_id)?;
    let notification = match request.status {
        NotificationStatus::Delivered => state.delivery.mark_delivered(tenant.as_str(), id).await?,
        NotificationStatus::Bounced => {
            let reason = request.reason.as_deref().unwrap_or("bounced");
            state
                .delivery
                .mark_bounced(tenant.as_str(), id, reason)
                .await?
        }
        other => {
            return Err(AppError::Validation(format!(
                "status {} cannot be reported by a provider",
                other
            )))
        }
    };

    Ok(Json(notification))
}

/// POST /api/v1/tenants/{tenant}/notifications/{id}/refresh
#[tracing::instrument(name = "http.refresh_notification", skip(state))]
pub async fn refresh_status(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
) -> Result<Json<Notification>> {
    let tenant = tenant(tenant_id)?;
    Ok(Json(state.delivery.refresh_status(tenant.as_str(), id).await?))
}
