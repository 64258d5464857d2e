//! Tenant template CRUD, preview and reset endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::domain::template::{
    CreateTemplateRequest, PreviewRequest, RenderedMessage, Template, TemplateListResponse,
    UpdateTemplateRequest,
};
use crate::error::Result;
use crate::server::AppState;

use super::{actor, tenant};

/// GET /api/v1/tenants/{tenant}/templates
#[tracing::instrument(name = "http.list_templates", skip(state))]
pub async fn list_templates(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<TemplateListResponse>> {
    let tenant = tenant(tenant_id)?;
    let templates = state.resolver.list(tenant.as_str()).await?;
    let total = templates.len();

    Ok(Json(TemplateListResponse { templates, total }))
}

/// POST /api/v1/tenants/{tenant}/templates
#[tracing::instrument(
    name = "http.create_template",
    skip(state, headers, request),
    fields(template_key = %request.key, channel = %request.channel)
)]
pub async fn create_template(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>)> {
    let tenant = tenant(tenant_id)?;
    let created = state
        .resolver
        .create(tenant.as_str(), &actor(&headers), request)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/tenants/{tenant}/templates/{id}
#[tracing::instrument(name = "http.get_template", skip(state))]
pub async fn get_template(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
) -> Result<Json<Template>> {
    let tenant = tenant(tenant_id)?;
    Ok(Json(state.resolver.get(tenant.as_str(), id).await?))
}

/// PUT /api/v1/tenants/{tenant}/templates/{id}
#[tracing::instrument(name = "http.update_template", skip(state, headers, request))]
pub async fn update_template(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<Template>> {
    let tenant = tenant(tenant_id)?;
    let updated = state
        .resolver
        .update(tenant.as_str(), &actor(&headers), id, request)
        .await?;

    Ok(Json(updated))
}

/// DELETE /api/v1/tenants/{tenant}/templates/{id}
///
/// Deactivates; the row is kept for notifications that reference it.
#[tracing::instrument(name = "http.delete_template", skip(state, headers))]
pub async fn delete_template(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<Template>> {
    let tenant = tenant(tenant_id)?;
    let deactivated = state
        .resolver
        .deactivate(tenant.as_str(), &actor(&headers), id)
        .await?;

    Ok(Json(deactivated))
}

/// POST /api/v1/tenants/{tenant}/templates/{id}/preview
#[tracing::instrument(name = "http.preview_template", skip(state, request))]
pub async fn preview_template(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<RenderedMessage>> {
    let tenant = tenant(tenant_id)?;
    let rendered = state
        .resolver
        .preview(tenant.as_str(), id, &request.variables)
        .await?;

    Ok(Json(rendered))
}

/// POST /api/v1/tenants/{tenant}/templates/{id}/reset
#[tracing::instrument(name = "http.reset_template", skip(state, headers))]
pub async fn reset_template(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<Template>> {
    let tenant = tenant(tenant_id)?;
    let reset = state
        .resolver
        .reset_to_default(tenant.as_str(), &actor(&headers), id)
        .await?;

    Ok(Json(reset))
}
