//! Notification delivery pipeline.
//!
//! `send` persists a `Pending` record, checks the tenant's rate limit, selects
//! a provider and drives the record through the lifecycle state machine,
//! retrying provider failures with a fixed delay until the attempt budget is
//! spent. Every outcome, including every provider error, is written to the
//! record before the call returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::domain::provider::{
    build_provider, OutboundMessage, Provider, ProviderConfig, ProviderError, ProviderRegistry,
};
use crate::domain::ratelimit::{RateLimitResult, RateLimiter};
use crate::domain::store::StoreError;
use crate::domain::template::{RenderError, TemplateError, TemplateResolver};
use crate::domain::tenant::{SettingsStore, TenantContext};
use crate::domain::vault::{CredentialVault, VaultError};
use crate::metrics::{DeliveryMetrics, RateLimitMetrics};

use super::store::NotificationStore;
use super::types::{
    ChannelType, InvalidTransition, Notification, NotificationFilter, NotificationStatus, Page,
};

/// Delivery error taxonomy
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(Uuid),

    #[error(transparent)]
    Render(RenderError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("No provider configured for channel {0}")]
    ProviderNotConfigured(ChannelType),

    #[error("Invalid provider configuration: {0}")]
    InvalidProviderConfig(String),

    #[error("Rate limit exceeded for {channel} (limit {limit}/min), retry after {retry_after:?}")]
    RateLimited {
        notification_id: Uuid,
        channel: ChannelType,
        retry_after: Duration,
        limit: u32,
    },

    #[error("Provider configuration could not be decrypted: {0}")]
    ConfigDecryption(VaultError),

    #[error("Delivery of {notification_id} failed after {attempts} attempt(s): {message}")]
    ProviderSendFailure {
        notification_id: Uuid,
        attempts: u32,
        message: String,
    },

    #[error("Delivery abandoned: {0}")]
    Cancelled(String),

    #[error("Notification storage error: {0}")]
    Store(#[from] StoreError),
}

impl DeliveryError {
    /// Record id the error refers to, when a record was written
    pub fn notification_id(&self) -> Option<Uuid> {
        match self {
            DeliveryError::NotificationNotFound(id)
            | DeliveryError::RateLimited {
                notification_id: id,
                ..
            }
            | DeliveryError::ProviderSendFailure {
                notification_id: id,
                ..
            } => Some(*id),
            _ => None,
        }
    }
}

impl From<TemplateError> for DeliveryError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(msg) => DeliveryError::TemplateNotFound(msg),
            TemplateError::Render(e) => DeliveryError::Render(e),
            TemplateError::Store(e) => DeliveryError::Store(e),
            e @ (TemplateError::InvalidKey(_)
            | TemplateError::InvalidTemplate(_)
            | TemplateError::AlreadyExists(_)) => DeliveryError::Validation(e.to_string()),
        }
    }
}

/// A send of already rendered content
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub tenant_id: String,
    pub channel: ChannelType,
    pub recipient: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(skip)]
    pub template_id: Option<Uuid>,
    #[serde(skip)]
    pub template_key: Option<String>,
}

/// A send driven by a template key
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSendRequest {
    pub tenant_id: String,
    pub key: String,
    pub channel: ChannelType,
    pub recipient: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub variables: Value,
    #[serde(default)]
    pub metadata: Value,
}

/// Cancellation and deadline a caller attaches to a send.
///
/// Detached sends use [`SendContext::detached`], which can never be
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct SendContext {
    cancel: CancellationToken,
    deadline: Option<tokio::time::Instant>,
}

impl SendContext {
    /// A context nobody can cancel
    pub fn detached() -> Self {
        Self::default()
    }

    /// Follow `token`; cancelling it abandons the send
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Abandon the send once `timeout` has elapsed. An earlier deadline
    /// already on the context is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = tokio::time::Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Reason the send must stop, if it must
    fn interruption(&self) -> Option<&'static str> {
        if self.cancel.is_cancelled() {
            Some("cancelled by caller")
        } else if self
            .deadline
            .is_some_and(|d| d <= tokio::time::Instant::now())
        {
            Some("deadline exceeded")
        } else {
            None
        }
    }

    /// Resolves when the context is cancelled or its deadline passes
    async fn interrupted(&self) -> &'static str {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => "cancelled by caller",
                _ = tokio::time::sleep_until(deadline) => "deadline exceeded",
            },
            None => {
                self.cancel.cancelled().await;
                "cancelled by caller"
            }
        }
    }
}

/// Outcome of a provider connectivity test
#[derive(Debug, Clone, Serialize)]
pub struct ProviderTestResult {
    pub channel: ChannelType,
    pub provider: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Provider built from tenant settings, tagged with the settings version
struct CachedProvider {
    version: u64,
    provider: Arc<dyn Provider>,
}

/// Orchestrates resolve, render, provider selection, send and retry
pub struct DeliveryService {
    store: Arc<dyn NotificationStore>,
    resolver: Arc<TemplateResolver>,
    providers: ProviderRegistry,
    tenant_settings: Arc<SettingsStore>,
    vault: Arc<CredentialVault>,
    rate_limiter: Arc<RateLimiter>,
    config: DeliveryConfig,
    tenant_providers: DashMap<(String, ChannelType), CachedProvider>,
}

impl DeliveryService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        resolver: Arc<TemplateResolver>,
        providers: ProviderRegistry,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            providers,
            tenant_settings: Arc::new(SettingsStore::new()),
            vault: Arc::new(CredentialVault::development()),
            rate_limiter: Arc::new(RateLimiter::new(Default::default())),
            config,
            tenant_providers: DashMap::new(),
        }
    }

    /// Use tenant-level provider configuration, decrypted with `vault`
    pub fn with_tenant_settings(
        mut self,
        settings: Arc<SettingsStore>,
        vault: Arc<CredentialVault>,
    ) -> Self {
        self.tenant_settings = settings;
        self.vault = vault;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn resolver(&self) -> &Arc<TemplateResolver> {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Send rendered content without caller cancellation
    pub async fn send(&self, request: SendRequest) -> Result<Notification, DeliveryError> {
        self.send_with_context(request, &SendContext::detached())
            .await
    }

    /// Resolve and render a template, then send it
    pub async fn send_template(
        &self,
        request: TemplateSendRequest,
    ) -> Result<Notification, DeliveryError> {
        self.send_template_with_context(request, &SendContext::detached())
            .await
    }

    pub async fn send_template_with_context(
        &self,
        request: TemplateSendRequest,
        ctx: &SendContext,
    ) -> Result<Notification, DeliveryError> {
        let (template, rendered) = self
            .resolver
            .render(
                &request.tenant_id,
                &request.key,
                request.channel,
                request.language.as_deref(),
                &request.variables,
            )
            .await?;

        let send = SendRequest {
            tenant_id: request.tenant_id,
            channel: request.channel,
            recipient: request.recipient,
            subject: rendered.subject,
            body: rendered.body,
            metadata: request.metadata,
            template_id: Some(template.id),
            template_key: Some(template.key),
        };
        self.send_with_context(send, ctx).await
    }

    /// Send rendered content, honouring the caller's cancellation and deadline
    #[tracing::instrument(
        name = "delivery.send",
        skip_all,
        fields(tenant_id = %request.tenant_id, channel = %request.channel, notification_id)
    )]
    pub async fn send_with_context(
        &self,
        request: SendRequest,
        ctx: &SendContext,
    ) -> Result<Notification, DeliveryError> {
        validate_request(&request)?;
        let started = Instant::now();

        let mut notification = Notification::new(
            request.tenant_id,
            request.channel,
            request.recipient,
            request.subject,
            request.body,
        );
        notification.template_id = request.template_id;
        notification.template_key = request.template_key;
        notification.metadata = request.metadata;
        tracing::Span::current().record("notification_id", tracing::field::display(notification.id));

        self.store.insert(&notification).await?;

        if let RateLimitResult::Denied { retry_after, limit } = self
            .rate_limiter
            .check(&notification.tenant_id, notification.channel)
        {
            RateLimitMetrics::record_denied(notification.channel.as_str());
            let err = DeliveryError::RateLimited {
                notification_id: notification.id,
                channel: notification.channel,
                retry_after,
                limit,
            };
            return Err(self
                .abort(notification, err, "rate_limited", started)
                .await);
        }

        let provider = match self.select_provider(&notification.tenant_id, notification.channel) {
            Ok(provider) => provider,
            Err(err) => return Err(self.abort(notification, err, "unavailable", started).await),
        };

        self.deliver(notification, provider.as_ref(), ctx, started)
            .await
    }

    /// Attempt loop; the record is `Pending` on entry
    async fn deliver(
        &self,
        mut notification: Notification,
        provider: &dyn Provider,
        ctx: &SendContext,
        started: Instant,
    ) -> Result<Notification, DeliveryError> {
        let max_attempts = self.config.retry_attempts.max(1);
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        let message = OutboundMessage {
            channel: notification.channel,
            to: notification.recipient.clone(),
            subject: notification.subject.clone(),
            body: notification.body.clone(),
        };
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if let Some(reason) = ctx.interruption() {
                return Err(self.abandon(notification, reason, started).await);
            }

            let previous = notification.status;
            notification.transition(NotificationStatus::Sending)?;
            self.store.update(&notification, previous).await?;
            DeliveryMetrics::record_attempt(notification.channel.as_str(), attempt);

            let result = tokio::select! {
                result = provider.send(&message) => result,
                reason = ctx.interrupted() => {
                    return Err(self.abandon(notification, reason, started).await);
                }
            };

            match result {
                Ok(receipt) => {
                    notification.provider_message_id = receipt.message_id;
                    notification.transition(NotificationStatus::Sent)?;
                    self.store
                        .update(&notification, NotificationStatus::Sending)
                        .await?;
                    DeliveryMetrics::record_outcome(
                        notification.channel.as_str(),
                        "sent",
                        started.elapsed(),
                    );
                    tracing::info!(
                        provider = provider.name(),
                        attempts = notification.attempts,
                        "Notification sent"
                    );
                    return Ok(notification);
                }
                Err(e) => {
                    last_error = e.to_string();
                    notification.fail(last_error.clone())?;
                    self.store
                        .update(&notification, NotificationStatus::Sending)
                        .await?;
                    tracing::warn!(
                        provider = provider.name(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Provider send failed"
                    );
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(retry_delay) => {}
                    reason = ctx.interrupted() => {
                        return Err(self.abandon(notification, reason, started).await);
                    }
                }
            }
        }

        DeliveryMetrics::record_outcome(notification.channel.as_str(), "failed", started.elapsed());
        tracing::error!(
            attempts = notification.attempts,
            error = %last_error,
            "Notification delivery failed permanently"
        );
        Err(DeliveryError::ProviderSendFailure {
            notification_id: notification.id,
            attempts: notification.attempts,
            message: last_error,
        })
    }

    /// Fail a record before any hand-off and hand back the error
    async fn abort(
        &self,
        mut notification: Notification,
        err: DeliveryError,
        outcome: &str,
        started: Instant,
    ) -> DeliveryError {
        DeliveryMetrics::record_outcome(notification.channel.as_str(), outcome, started.elapsed());
        tracing::warn!(error = %err, "Notification not handed to a provider");

        let previous = notification.status;
        if let Err(e) = notification.fail(err.to_string()) {
            return e.into();
        }
        if let Err(e) = self.store.update(&notification, previous).await {
            return e.into();
        }
        err
    }

    /// Stop delivery on caller cancellation or deadline
    async fn abandon(
        &self,
        mut notification: Notification,
        reason: &str,
        started: Instant,
    ) -> DeliveryError {
        DeliveryMetrics::record_outcome(notification.channel.as_str(), "cancelled", started.elapsed());
        tracing::warn!(reason, attempts = notification.attempts, "Notification delivery abandoned");

        // A record already marked Failed by the last attempt keeps that status
        let previous = notification.status;
        if previous != NotificationStatus::Failed {
            if let Err(e) = notification.fail(reason) {
                return e.into();
            }
        } else {
            notification.error = Some(reason.to_string());
        }
        if let Err(e) = self.store.update(&notification, previous).await {
            return e.into();
        }
        DeliveryError::Cancelled(reason.to_string())
    }

    /// Tenant provider configuration wins over the process-wide registry.
    ///
    /// Tenant configuration is decrypted and built on first use and cached
    /// until the tenant's settings change.
    fn select_provider(
        &self,
        tenant_id: &str,
        channel: ChannelType,
    ) -> Result<Arc<dyn Provider>, DeliveryError> {
        let settings = self.tenant_settings.snapshot(tenant_id);
        let Some(stored) = settings.provider(channel) else {
            return self
                .providers
                .get(channel)
                .ok_or(DeliveryError::ProviderNotConfigured(channel));
        };

        let cache_key = (tenant_id.to_string(), channel);
        if let Some(cached) = self.tenant_providers.get(&cache_key) {
            if cached.version == settings.version {
                return Ok(Arc::clone(&cached.provider));
            }
        }

        let config = ProviderConfig {
            settings: self
                .vault
                .decrypt(&stored.settings)
                .map_err(DeliveryError::ConfigDecryption)?,
            ..stored.clone()
        };
        let provider = build_provider(&config)
            .map_err(|e| DeliveryError::InvalidProviderConfig(e.to_string()))?;

        self.tenant_providers.insert(
            cache_key,
            CachedProvider {
                version: settings.version,
                provider: Arc::clone(&provider),
            },
        );
        Ok(provider)
    }

    /// Send one test message through the tenant's provider for `channel`.
    ///
    /// No notification record is written; provider errors are reported in
    /// the result rather than returned.
    pub async fn test_provider(
        &self,
        tenant_id: &str,
        channel: ChannelType,
        recipient: &str,
    ) -> Result<ProviderTestResult, DeliveryError> {
        if recipient.trim().is_empty() {
            return Err(DeliveryError::Validation("recipient is required".to_string()));
        }
        let provider = self.select_provider(tenant_id, channel)?;

        let message = OutboundMessage {
            channel,
            to: recipient.to_string(),
            subject: "Test notification".to_string(),
            body: "This is a test message confirming your provider configuration.".to_string(),
        };

        let started = Instant::now();
        let result = provider.send(&message).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            tenant_id = %tenant_id,
            channel = %channel,
            provider = provider.name(),
            success = result.is_ok(),
            latency_ms,
            "Provider test finished"
        );

        Ok(match result {
            Ok(receipt) => ProviderTestResult {
                channel,
                provider: provider.name().to_string(),
                success: true,
                latency_ms,
                message_id: receipt.message_id,
                error: None,
            },
            Err(e) => ProviderTestResult {
                channel,
                provider: provider.name().to_string(),
                success: false,
                latency_ms,
                message_id: None,
                error: Some(e.to_string()),
            },
        })
    }

    pub async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Notification, DeliveryError> {
        self.store
            .get(tenant_id, id)
            .await?
            .ok_or(DeliveryError::NotificationNotFound(id))
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, DeliveryError> {
        Ok(self.store.list(tenant_id, filter).await?)
    }

    /// Provider confirmed delivery (`Sent -> Delivered`)
    pub async fn mark_delivered(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Notification, DeliveryError> {
        self.apply_callback(tenant_id, id, NotificationStatus::Delivered, None)
            .await
    }

    /// Provider reported a bounce (`Sent -> Bounced`)
    pub async fn mark_bounced(
        &self,
        tenant_id: &str,
        id: Uuid,
        reason: &str,
    ) -> Result<Notification, DeliveryError> {
        self.apply_callback(tenant_id, id, NotificationStatus::Bounced, Some(reason))
            .await
    }

    async fn apply_callback(
        &self,
        tenant_id: &str,
        id: Uuid,
        status: NotificationStatus,
        reason: Option<&str>,
    ) -> Result<Notification, DeliveryError> {
        let mut notification = self.get(tenant_id, id).await?;
        let previous = notification.status;
        notification.transition(status)?;
        if let Some(reason) = reason {
            notification.error = Some(reason.to_string());
        }

        match self.store.update(&notification, previous).await {
            Ok(()) => {}
            Err(StoreError::Stale(detail)) => {
                // Another callback moved the record first
                let current = self.get(tenant_id, id).await?;
                tracing::warn!(
                    notification_id = %id,
                    status = %status,
                    detail = %detail,
                    "Delivery status update lost a race"
                );
                return Err(InvalidTransition {
                    from: current.status,
                    to: status,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }
        DeliveryMetrics::record_callback(status.as_str());

        tracing::info!(
            tenant_id = %tenant_id,
            notification_id = %id,
            status = %status,
            "Delivery status updated"
        );
        Ok(notification)
    }

    /// Ask the provider for the current delivery status and apply it.
    ///
    /// Statuses that do not advance the record are ignored.
    pub async fn refresh_status(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Notification, DeliveryError> {
        let notification = self.get(tenant_id, id).await?;
        let Some(message_id) = notification.provider_message_id.clone() else {
            return Err(DeliveryError::Validation(
                "notification has no provider message id".to_string(),
            ));
        };

        let provider = self.select_provider(tenant_id, notification.channel)?;
        let status = match provider.status(&message_id).await {
            Ok(status) => status,
            Err(ProviderError::Unsupported(name)) => {
                return Err(DeliveryError::Validation(format!(
                    "provider {} does not support status queries",
                    name
                )))
            }
            Err(e) => {
                return Err(DeliveryError::ProviderSendFailure {
                    notification_id: id,
                    attempts: notification.attempts,
                    message: e.to_string(),
                })
            }
        };

        match status.as_notification_status() {
            Some(next) if notification.status.can_transition_to(next) => {
                let reason = (next == NotificationStatus::Bounced)
                    .then(|| format!("provider reported {:?}", status).to_lowercase());
                self.apply_callback(tenant_id, id, next, reason.as_deref())
                    .await
            }
            _ => Ok(notification),
        }
    }
}

fn validate_request(request: &SendRequest) -> Result<(), DeliveryError> {
    TenantContext::new(request.tenant_id.as_str())
        .map_err(|e| DeliveryError::Validation(e.to_string()))?;

    let recipient = request.recipient.trim();
    if recipient.is_empty() {
        return Err(DeliveryError::Validation("recipient is required".to_string()));
    }
    match request.channel {
        ChannelType::Email if !recipient.contains('@') => {
            return Err(DeliveryError::Validation(format!(
                "invalid email recipient: {}",
                recipient
            )))
        }
        ChannelType::Sms
            if !recipient
                .trim_start_matches('+')
                .chars()
                .all(|c| c.is_ascii_digit()) =>
        {
            return Err(DeliveryError::Validation(format!(
                "invalid phone number: {}",
                recipient
            )))
        }
        _ => {}
    }

    if request.body.trim().is_empty() {
        return Err(DeliveryError::Validation("body must not be empty".to_string()));
    }
    Ok(())
}
