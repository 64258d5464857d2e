//! Tenant provider configuration endpoints.
//!
//! Sensitive settings are encrypted before they are stored and masked
//! whenever they are returned. A masked value sent back on update keeps the
//! stored secret.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::audit::AuditEntry;
use crate::domain::notification::{ChannelType, ProviderTestResult};
use crate::domain::provider::{build_provider, ProviderConfig, ProviderKind};
use crate::domain::vault::{is_sensitive_field, CredentialVault, MASK};
use crate::error::{AppError, Result};
use crate::server::AppState;

use super::{actor, tenant};

/// Provider configuration as submitted by a tenant
#[derive(Debug, Deserialize)]
pub struct ProviderConfigRequest {
    pub provider: ProviderKind,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// Provider configuration with secrets masked
#[derive(Debug, Serialize)]
pub struct ProviderConfigView {
    pub channel: ChannelType,
    pub provider: ProviderKind,
    pub from_address: String,
    pub from_name: String,
    pub settings: Map<String, Value>,
    /// Settings version this view was read from
    pub version: u64,
}

impl ProviderConfigView {
    fn new(config: &ProviderConfig, version: u64) -> Self {
        Self {
            channel: config.channel,
            provider: config.provider,
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
            settings: CredentialVault::mask(&config.settings),
            version,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderTestRequest {
    pub recipient: String,
}

/// GET /api/v1/tenants/{tenant}/providers/{channel}
#[tracing::instrument(name = "http.get_provider", skip(state))]
pub async fn get_provider(
    State(state): State<AppState>,
    Path((tenant_id, channel)): Path<(String, ChannelType)>,
) -> Result<Json<ProviderConfigView>> {
    let tenant = tenant(tenant_id)?;
    let snapshot = state.tenant_settings.snapshot(tenant.as_str());
    let config = snapshot
        .provider(channel)
        .ok_or_else(|| AppError::NotFound(format!("no {} provider configured", channel)))?;

    Ok(Json(ProviderConfigView::new(config, snapshot.version)))
}

/// PUT /api/v1/tenants/{tenant}/providers/{channel}
#[tracing::instrument(
    name = "http.put_provider",
    skip(state, headers, request),
    fields(provider = %request.provider)
)]
pub async fn put_provider(
    State(state): State<AppState>,
    Path((tenant_id, channel)): Path<(String, ChannelType)>,
    headers: HeaderMap,
    Json(request): Json<ProviderConfigRequest>,
) -> Result<Json<ProviderConfigView>> {
    let tenant = tenant(tenant_id)?;
    let existing = state.tenant_settings.snapshot(tenant.as_str());

    let mut plain = ProviderConfig::new(channel, request.provider)
        .with_sender(request.from_address, request.from_name);
    plain.settings = unmask(&state.vault, request.settings, existing.provider(channel))?;

    // Reject configurations that could not build a provider
    build_provider(&plain)?;

    let stored = ProviderConfig {
        settings: state.vault.encrypt(&plain.settings)?,
        ..plain
    };
    let snapshot = state.tenant_settings.set_provider(tenant.as_str(), stored);

    state.audit.record(
        AuditEntry::new(
            tenant.as_str(),
            actor(&headers),
            "provider.updated",
            channel.as_str(),
        )
        .with_metadata(serde_json::json!({ "provider": request.provider })),
    );

    let config = snapshot
        .provider(channel)
        .ok_or_else(|| AppError::Internal("provider missing after update".to_string()))?;
    Ok(Json(ProviderConfigView::new(config, snapshot.version)))
}

/// DELETE /api/v1/tenants/{tenant}/providers/{channel}
///
/// Falls back to the process-wide provider for the channel.
#[tracing::instrument(name = "http.delete_provider", skip(state, headers))]
pub async fn delete_provider(
    State(state): State<AppState>,
    Path((tenant_id, channel)): Path<(String, ChannelType)>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let tenant = tenant(tenant_id)?;
    if state
        .tenant_settings
        .snapshot(tenant.as_str())
        .provider(channel)
        .is_none()
    {
        return Err(AppError::NotFound(format!("no {} provider configured", channel)));
    }

    state.tenant_settings.remove_provider(tenant.as_str(), channel);
    state.audit.record(AuditEntry::new(
        tenant.as_str(),
        actor(&headers),
        "provider.removed",
        channel.as_str(),
    ));
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/tenants/{tenant}/providers/{channel}/test
#[tracing::instrument(name = "http.test_provider", skip(state, request))]
pub async fn test_provider(
    State(state): State<AppState>,
    Path((tenant_id, channel)): Path<(String, ChannelType)>,
    Json(request): Json<ProviderTestRequest>,
) -> Result<Json<ProviderTestResult>> {
    let tenant = tenant(tenant_id)?;
    let result = state
        .delivery
        .test_provider(tenant.as_str(), channel, &request.recipient)
        .await?;

    Ok(Json(result))
}

/// Replace masked sensitive values with the stored plaintext
fn unmask(
    vault: &CredentialVault,
    mut settings: Map<String, Value>,
    existing: Option<&ProviderConfig>,
) -> Result<Map<String, Value>> {
    let masked: Vec<String> = settings
        .iter()
        .filter(|(key, value)| is_sensitive_field(key) && value.as_str() == Some(MASK))
        .map(|(key, _)| key.clone())
        .collect();
    if masked.is_empty() {
        return Ok(settings);
    }

    let stored = match existing {
        Some(config) => vault.decrypt(&config.settings)?,
        None => Map::new(),
    };
    for key in masked {
        let value = stored.get(&key).cloned().ok_or_else(|| {
            AppError::Validation(format!("no stored value for masked setting `{}`", key))
        })?;
        settings.insert(key, value);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(vault: &CredentialVault) -> ProviderConfig {
        let mut config = ProviderConfig::new(ChannelType::Email, ProviderKind::HttpEmail)
            .with_setting("api_key", "sk-live-123")
            .with_setting("endpoint", "https://mail.example.com");
        config.settings = vault.encrypt(&config.settings).unwrap();
        config
    }

    #[test]
    fn test_unmask_keeps_stored_secret() {
        let vault = CredentialVault::development();
        let existing = stored(&vault);

        let mut submitted = Map::new();
        submitted.insert("api_key".into(), Value::String(MASK.into()));
        submitted.insert("endpoint".into(), Value::String("https://other.example.com".into()));

        let settings = unmask(&vault, submitted, Some(&existing)).unwrap();
        assert_eq!(settings["api_key"], "sk-live-123");
        assert_eq!(settings["endpoint"], "https://other.example.com");
    }

    #[test]
    fn test_unmask_without_stored_value_is_rejected() {
        let vault = CredentialVault::development();
        let mut submitted = Map::new();
        submitted.insert("api_key".into(), Value::String(MASK.into()));

        assert!(matches!(
            unmask(&vault, submitted, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_view_masks_secrets() {
        let vault = CredentialVault::development();
        let view = ProviderConfigView::new(&stored(&vault), 3);
        assert_eq!(view.settings["api_key"], MASK);
        assert_eq!(view.settings["endpoint"], "https://mail.example.com");
        assert_eq!(view.version, 3);
    }
}
