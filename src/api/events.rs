//! Event dispatch and auto-send endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{DispatchOutcome, EventRequest, EventType, Priority, Recipient};
use crate::domain::audit::AuditEntry;
use crate::domain::notification::{ChannelType, Notification, SendContext};
use crate::error::Result;
use crate::server::AppState;

use super::{actor, tenant};

#[derive(Debug, Deserialize)]
pub struct DispatchEventRequest {
    pub event: EventType,
    /// Defaults to the event's usual channel
    #[serde(default)]
    pub channel: Option<ChannelType>,
    pub recipient: Recipient,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct DispatchEventResponse {
    pub outcome: &'static str,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

#[derive(Debug, Deserialize)]
pub struct AutoSendRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct AutoSendResponse {
    pub event: EventType,
    pub enabled: bool,
    pub version: u64,
}

/// POST /api/v1/tenants/{tenant}/events
///
/// Critical events answer once delivered; other tiers answer `202` once
/// queued, or `503` when the worker pool refuses the job.
#[tracing::instrument(
    name = "http.dispatch_event",
    skip(state, request),
    fields(event = %request.event)
)]
pub async fn dispatch_event(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(request): Json<DispatchEventRequest>,
) -> Result<(StatusCode, Json<DispatchEventResponse>)> {
    let tenant = tenant(tenant_id)?;
    let priority = request.event.priority();

    let mut event = EventRequest::new(request.event, tenant.tenant_id, request.recipient);
    if let Some(channel) = request.channel {
        event = event.with_channel(channel);
    }
    event.variables.extend(request.variables);

    // A dropped connection abandons an in-progress critical send
    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();
    let ctx = SendContext::default().with_cancellation(token);

    let outcome = state.dispatcher.dispatch(event, &ctx).await?;
    let status = match outcome {
        DispatchOutcome::Sent(_) | DispatchOutcome::Skipped => StatusCode::OK,
        DispatchOutcome::Queued => StatusCode::ACCEPTED,
        DispatchOutcome::Rejected => StatusCode::SERVICE_UNAVAILABLE,
    };
    let outcome_name = outcome.as_str();
    let notification = match outcome {
        DispatchOutcome::Sent(notification) => Some(notification),
        _ => None,
    };

    Ok((
        status,
        Json(DispatchEventResponse {
            outcome: outcome_name,
            priority,
            notification,
        }),
    ))
}

/// PUT /api/v1/tenants/{tenant}/auto-send/{event}
#[tracing::instrument(name = "http.set_auto_send", skip(state, headers, request))]
pub async fn set_auto_send(
    State(state): State<AppState>,
    Path((tenant_id, event)): Path<(String, EventType)>,
    headers: HeaderMap,
    Json(request): Json<AutoSendRequest>,
) -> Result<Json<AutoSendResponse>> {
    let tenant = tenant(tenant_id)?;
    let snapshot = state
        .tenant_settings
        .set_auto_send(tenant.as_str(), event.as_str(), request.enabled);

    state.audit.record(
        AuditEntry::new(tenant.as_str(), actor(&headers), "auto_send.updated", event.as_str())
            .with_metadata(serde_json::json!({ "enabled": request.enabled })),
    );

    Ok(Json(AutoSendResponse {
        event,
        enabled: snapshot.auto_send_enabled(event.as_str()),
        version: snapshot.version,
    }))
}
