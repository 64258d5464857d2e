//! Priority-tiered dispatcher.
//!
//! Critical events run on the caller's task under the caller's cancellation
//! and deadline, and their errors are the caller's errors. Every other tier
//! is handed to the [`WorkerPool`] with a fresh context; its failures are
//! logged at the tier's level and never reach the caller of the typed
//! `send_*` methods, including requests rejected before queueing.
//! [`PriorityDispatcher::dispatch`] still reports invalid requests so the
//! HTTP surface can answer them.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DeliveryConfig, DispatchConfig};
use crate::domain::notification::{ChannelType, Notification, SendContext};
use crate::metrics::DispatchMetrics;

use super::adapter::{EventRequest, NotificationAdapter, Recipient};
use super::events::{EventType, Priority};
use super::pool::WorkerPool;
use super::DispatchError;

/// What happened to a dispatched event
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Delivered synchronously
    Sent(Notification),
    /// Handed to the worker pool
    Queued,
    /// Turned off by the tenant's auto-send settings
    Skipped,
    /// Worker pool full or shut down; nothing was sent
    Rejected,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent(_) => "sent",
            DispatchOutcome::Queued => "queued",
            DispatchOutcome::Skipped => "skipped",
            DispatchOutcome::Rejected => "rejected",
        }
    }
}

pub struct PriorityDispatcher {
    adapter: Arc<NotificationAdapter>,
    pool: Arc<WorkerPool>,
    async_enabled: bool,
    critical_timeout: Option<Duration>,
}

impl PriorityDispatcher {
    pub fn new(
        adapter: Arc<NotificationAdapter>,
        pool: Arc<WorkerPool>,
        dispatch: &DispatchConfig,
        delivery: &DeliveryConfig,
    ) -> Self {
        if !dispatch.async_enabled {
            tracing::warn!("Asynchronous dispatch disabled, every tier runs synchronously");
        }
        Self {
            adapter,
            pool,
            async_enabled: dispatch.async_enabled,
            critical_timeout: (delivery.critical_timeout_ms > 0)
                .then(|| Duration::from_millis(delivery.critical_timeout_ms)),
        }
    }

    pub fn adapter(&self) -> &Arc<NotificationAdapter> {
        &self.adapter
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Dispatch `request` according to its event's tier.
    ///
    /// `ctx` only applies to sends that run on the caller's task.
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(
            tenant_id = %request.tenant_id,
            event = %request.event,
            priority = %request.event.priority(),
        )
    )]
    pub async fn dispatch(
        &self,
        request: EventRequest,
        ctx: &SendContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        if request.recipient.address.trim().is_empty() {
            return Err(DispatchError::Validation("recipient address is required".to_string()));
        }

        let priority = request.event.priority();
        if priority.is_critical() || !self.async_enabled {
            return self.dispatch_inline(request, ctx, priority).await;
        }

        if !self.adapter.is_enabled(&request.tenant_id, request.event) {
            DispatchMetrics::record(priority.as_str(), "skipped");
            return Ok(DispatchOutcome::Skipped);
        }

        let adapter = Arc::clone(&self.adapter);
        let event = request.event;
        let tenant_id = request.tenant_id.clone();
        let submitted = self.pool.try_submit(priority, async move {
            match adapter.send(request, &SendContext::detached()).await {
                Ok(Some(_)) => DispatchMetrics::record(priority.as_str(), "sent"),
                Ok(None) => DispatchMetrics::record(priority.as_str(), "skipped"),
                Err(e) => {
                    DispatchMetrics::record(priority.as_str(), "failed");
                    log_failure(priority, event, &tenant_id, &DispatchError::from(e));
                }
            }
        });

        match submitted {
            Ok(()) => {
                DispatchMetrics::record(priority.as_str(), "queued");
                Ok(DispatchOutcome::Queued)
            }
            Err(e) => {
                log_rejection(priority, event, &e);
                Ok(DispatchOutcome::Rejected)
            }
        }
    }

    async fn dispatch_inline(
        &self,
        request: EventRequest,
        ctx: &SendContext,
        priority: Priority,
    ) -> Result<DispatchOutcome, DispatchError> {
        let ctx = match self.critical_timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        };

        match self.adapter.send(request, &ctx).await {
            Ok(Some(notification)) => {
                DispatchMetrics::record(priority.as_str(), "sent");
                Ok(DispatchOutcome::Sent(notification))
            }
            Ok(None) => {
                DispatchMetrics::record(priority.as_str(), "skipped");
                Ok(DispatchOutcome::Skipped)
            }
            Err(e) => {
                DispatchMetrics::record(priority.as_str(), "failed");
                tracing::error!(error = %e, "Synchronous notification dispatch failed");
                Err(e.into())
            }
        }
    }

    async fn run(&self, request: EventRequest, ctx: &SendContext) -> Result<(), DispatchError> {
        self.dispatch(request, ctx).await.map(|_| ())
    }

    /// Non-critical tiers only report errors when running synchronously
    async fn run_detached(&self, request: EventRequest) -> Result<(), DispatchError> {
        let priority = request.event.priority();
        let event = request.event;
        let tenant_id = request.tenant_id.clone();

        match self.run(request, &SendContext::detached()).await {
            Err(e) if self.async_enabled => {
                DispatchMetrics::record(priority.as_str(), "failed");
                log_failure(priority, event, &tenant_id, &e);
                Ok(())
            }
            result => result,
        }
    }

    // ========================================================================
    // Critical
    // ========================================================================

    pub async fn send_mfa_code(
        &self,
        ctx: &SendContext,
        tenant_id: &str,
        channel: ChannelType,
        recipient: Recipient,
        code: &str,
        expires_in_minutes: u32,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::MfaCode, tenant_id, recipient)
            .with_channel(channel)
            .with_var("code", code)
            .with_var("expiresInMinutes", expires_in_minutes);
        self.run(request, ctx).await
    }

    pub async fn send_phone_verification(
        &self,
        ctx: &SendContext,
        tenant_id: &str,
        recipient: Recipient,
        code: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::PhoneVerification, tenant_id, recipient)
            .with_var("code", code);
        self.run(request, ctx).await
    }

    pub async fn send_magic_link(
        &self,
        ctx: &SendContext,
        tenant_id: &str,
        recipient: Recipient,
        link: &str,
        expires_in_minutes: u32,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::MagicLink, tenant_id, recipient)
            .with_var("link", link)
            .with_var("expiresInMinutes", expires_in_minutes);
        self.run(request, ctx).await
    }

    pub async fn send_password_reset(
        &self,
        ctx: &SendContext,
        tenant_id: &str,
        recipient: Recipient,
        link: &str,
    ) -> Result<(), DispatchError> {
        let request =
            EventRequest::new(EventType::PasswordReset, tenant_id, recipient).with_var("link", link);
        self.run(request, ctx).await
    }

    // ========================================================================
    // High
    // ========================================================================

    pub async fn send_email_verification(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        link: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::EmailVerification, tenant_id, recipient)
            .with_var("link", link);
        self.run_detached(request).await
    }

    pub async fn send_suspicious_login(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        ip_address: &str,
        location: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::SuspiciousLogin, tenant_id, recipient)
            .with_var("ipAddress", ip_address)
            .with_var("location", location);
        self.run_detached(request).await
    }

    pub async fn send_password_changed(
        &self,
        tenant_id: &str,
        recipient: Recipient,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::PasswordChanged, tenant_id, recipient);
        self.run_detached(request).await
    }

    pub async fn send_org_invite(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        inviter_name: &str,
        org_name: &str,
        link: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::OrgInvite, tenant_id, recipient)
            .with_var("inviterName", inviter_name)
            .with_var("orgName", org_name)
            .with_var("link", link);
        self.run_detached(request).await
    }

    // ========================================================================
    // Normal
    // ========================================================================

    pub async fn send_welcome(
        &self,
        tenant_id: &str,
        recipient: Recipient,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::Welcome, tenant_id, recipient);
        self.run_detached(request).await
    }

    pub async fn send_account_deactivated(
        &self,
        tenant_id: &str,
        recipient: Recipient,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::AccountDeactivated, tenant_id, recipient);
        self.run_detached(request).await
    }

    pub async fn send_account_deleted(
        &self,
        tenant_id: &str,
        recipient: Recipient,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::AccountDeleted, tenant_id, recipient);
        self.run_detached(request).await
    }

    pub async fn send_org_member_added(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        org_name: &str,
        role: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::OrgMemberAdded, tenant_id, recipient)
            .with_var("orgName", org_name)
            .with_var("role", role);
        self.run_detached(request).await
    }

    pub async fn send_org_member_removed(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        org_name: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::OrgMemberRemoved, tenant_id, recipient)
            .with_var("orgName", org_name);
        self.run_detached(request).await
    }

    pub async fn send_org_role_changed(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        org_name: &str,
        role: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::OrgRoleChanged, tenant_id, recipient)
            .with_var("orgName", org_name)
            .with_var("role", role);
        self.run_detached(request).await
    }

    // ========================================================================
    // Low
    // ========================================================================

    pub async fn send_new_device_login(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        device: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::NewDeviceLogin, tenant_id, recipient)
            .with_var("device", device);
        self.run_detached(request).await
    }

    pub async fn send_new_location_login(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        location: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::NewLocationLogin, tenant_id, recipient)
            .with_var("location", location);
        self.run_detached(request).await
    }

    pub async fn send_session_revoked(
        &self,
        tenant_id: &str,
        recipient: Recipient,
        device: &str,
    ) -> Result<(), DispatchError> {
        let request = EventRequest::new(EventType::SessionRevoked, tenant_id, recipient)
            .with_var("device", device);
        self.run_detached(request).await
    }
}

fn log_failure(priority: Priority, event: EventType, tenant_id: &str, err: &DispatchError) {
    let notification_id = err.notification_id().map(|id| id.to_string());
    match priority {
        Priority::Critical | Priority::High => tracing::error!(
            tenant_id = %tenant_id,
            event = %event,
            notification_id = ?notification_id,
            error = %err,
            "Detached notification failed"
        ),
        Priority::Normal => tracing::info!(
            tenant_id = %tenant_id,
            event = %event,
            notification_id = ?notification_id,
            error = %err,
            "Detached notification failed"
        ),
        Priority::Low => tracing::trace!(
            tenant_id = %tenant_id,
            event = %event,
            error = %err,
            "Low priority notification failed"
        ),
    }
}

fn log_rejection(priority: Priority, event: EventType, err: &super::pool::PoolError) {
    match priority {
        Priority::Critical | Priority::High => {
            tracing::error!(event = %event, error = %err, "Notification rejected by worker pool")
        }
        Priority::Normal => {
            tracing::info!(event = %event, error = %err, "Notification rejected by worker pool")
        }
        Priority::Low => {
            tracing::trace!(event = %event, error = %err, "Notification rejected by worker pool")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::MemoryAuditSink;
    use crate::domain::notification::{
        DeliveryError, DeliveryService, MemoryNotificationStore, NotificationFilter,
        NotificationStatus,
    };
    use crate::domain::provider::{MockBehavior, MockProvider, ProviderRegistry};
    use crate::domain::template::{DefaultCatalog, MemoryTemplateStore, TemplateResolver};
    use crate::domain::tenant::{SettingsStore, TenantConfig};

    struct Harness {
        dispatcher: PriorityDispatcher,
        delivery: Arc<DeliveryService>,
        pool: Arc<WorkerPool>,
    }

    fn harness(behavior: MockBehavior, async_enabled: bool) -> Harness {
        let resolver = Arc::new(TemplateResolver::new(
            Arc::new(MemoryTemplateStore::new()),
            Arc::new(DefaultCatalog::builtin()),
            TenantConfig::default(),
            Arc::new(MemoryAuditSink::new()),
        ));
        let delivery_config = DeliveryConfig {
            retry_attempts: 2,
            retry_delay_ms: 1,
            critical_timeout_ms: 0,
        };
        let registry = ProviderRegistry::new()
            .with_provider(Arc::new(MockProvider::new(ChannelType::Email).with_behavior(behavior)))
            .with_provider(Arc::new(MockProvider::new(ChannelType::Sms).with_behavior(behavior)));
        let delivery = Arc::new(DeliveryService::new(
            Arc::new(MemoryNotificationStore::new()),
            resolver,
            registry,
            delivery_config.clone(),
        ));
        let adapter = Arc::new(NotificationAdapter::new(
            Arc::clone(&delivery),
            Arc::new(SettingsStore::new()),
            "Acme",
        ));
        let pool = Arc::new(WorkerPool::new(4, 16));
        let dispatch_config = DispatchConfig {
            async_enabled,
            ..Default::default()
        };

        Harness {
            dispatcher: PriorityDispatcher::new(
                adapter,
                Arc::clone(&pool),
                &dispatch_config,
                &delivery_config,
            ),
            delivery,
            pool,
        }
    }

    #[tokio::test]
    async fn test_critical_failure_propagates() {
        let h = harness(MockBehavior::AlwaysFail, true);
        let result = h
            .dispatcher
            .send_password_reset(
                &SendContext::detached(),
                "acme",
                Recipient::new("ann@example.com"),
                "https://example.com/reset",
            )
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::Delivery(DeliveryError::ProviderSendFailure { attempts: 2, .. }))
        ));
    }

    #[tokio::test]
    async fn test_low_failure_never_propagates() {
        let h = harness(MockBehavior::AlwaysFail, true);
        h.dispatcher
            .send_new_device_login("acme", Recipient::new("ann@example.com"), "Firefox")
            .await
            .unwrap();

        assert!(h.pool.shutdown(Duration::from_secs(5)).await);

        // The failure is still recorded
        let page = h
            .delivery
            .list("acme", &NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status, NotificationStatus::Failed);
        assert!(page.items[0].error.is_some());
    }

    #[tokio::test]
    async fn test_detached_send_completes_after_return() {
        let h = harness(MockBehavior::Succeed, true);
        h.dispatcher
            .send_welcome("acme", Recipient::new("ann@example.com").named("Ann"))
            .await
            .unwrap();

        assert!(h.pool.shutdown(Duration::from_secs(5)).await);
        let page = h
            .delivery
            .list("acme", &NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].status, NotificationStatus::Sent);
        assert!(page.items[0].body.contains("Ann"));
    }

    #[tokio::test]
    async fn test_async_disabled_behaves_as_critical() {
        let h = harness(MockBehavior::AlwaysFail, false);
        let result = h
            .dispatcher
            .send_welcome("acme", Recipient::new("ann@example.com"))
            .await;
        assert!(matches!(result, Err(DispatchError::Delivery(_))));
        assert_eq!(h.pool.stats().completed, 0);
    }

    #[tokio::test]
    async fn test_critical_uses_caller_cancellation() {
        let h = harness(MockBehavior::Succeed, true);
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = SendContext::detached().with_cancellation(token);

        let result = h
            .dispatcher
            .send_mfa_code(&ctx, "acme", ChannelType::Sms, Recipient::new("+15550100"), "123456", 5)
            .await;
        assert!(matches!(
            result,
            Err(DispatchError::Delivery(DeliveryError::Cancelled(_)))
        ));
    }

    #[tokio::test]
    async fn test_rejected_when_pool_closed() {
        let h = harness(MockBehavior::Succeed, true);
        h.pool.shutdown(Duration::from_secs(1)).await;

        let outcome = h
            .dispatcher
            .dispatch(
                EventRequest::new(EventType::OrgInvite, "acme", Recipient::new("bob@example.com")),
                &SendContext::detached(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Rejected));
    }

    #[tokio::test]
    async fn test_empty_recipient_is_validation_error() {
        let h = harness(MockBehavior::Succeed, true);
        assert!(matches!(
            h.dispatcher
                .dispatch(
                    EventRequest::new(EventType::Welcome, "acme", Recipient::new("  ")),
                    &SendContext::detached(),
                )
                .await,
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            h.dispatcher
                .send_magic_link(&SendContext::detached(), "acme", Recipient::new(""), "https://x", 15)
                .await,
            Err(DispatchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_detached_request_never_propagates() {
        let h = harness(MockBehavior::Succeed, true);
        h.dispatcher
            .send_welcome("acme", Recipient::new("  "))
            .await
            .unwrap();
        h.dispatcher
            .send_suspicious_login("acme", Recipient::new(""), "10.0.0.1", "Firefox")
            .await
            .unwrap();
        h.dispatcher
            .send_new_device_login("acme", Recipient::new(""), "Firefox")
            .await
            .unwrap();
        h.dispatcher
            .send_session_revoked("acme", Recipient::new(" "), "Firefox")
            .await
            .unwrap();

        assert_eq!(h.pool.stats().completed, 0);
        let page = h
            .delivery
            .list("acme", &NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_invalid_request_propagates_when_async_disabled() {
        let h = harness(MockBehavior::Succeed, false);
        assert!(matches!(
            h.dispatcher.send_welcome("acme", Recipient::new("")).await,
            Err(DispatchError::Validation(_))
        ));
    }
}
