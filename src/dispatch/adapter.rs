//! Synchronous notification adapter.
//!
//! Turns a product event into a template send: picks the template key,
//! assembles the variables every template may rely on (`userName`,
//! `appName`) and honours the tenant's auto-send toggles.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::notification::{
    ChannelType, DeliveryError, DeliveryService, Notification, SendContext, TemplateSendRequest,
};
use crate::domain::tenant::SettingsStore;

use super::events::EventType;

/// Who receives a notification
#[derive(Debug, Clone, Deserialize)]
pub struct Recipient {
    /// Email address or phone number
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            language: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// One event to notify about
#[derive(Debug, Clone)]
pub struct EventRequest {
    pub event: EventType,
    pub tenant_id: String,
    pub channel: ChannelType,
    pub recipient: Recipient,
    pub variables: Map<String, Value>,
}

impl EventRequest {
    pub fn new(event: EventType, tenant_id: impl Into<String>, recipient: Recipient) -> Self {
        Self {
            event,
            tenant_id: tenant_id.into(),
            channel: event.default_channel(),
            recipient,
            variables: Map::new(),
        }
    }

    pub fn with_channel(mut self, channel: ChannelType) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }
}

pub struct NotificationAdapter {
    delivery: Arc<DeliveryService>,
    settings: Arc<SettingsStore>,
    app_name: String,
}

impl NotificationAdapter {
    pub fn new(
        delivery: Arc<DeliveryService>,
        settings: Arc<SettingsStore>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            delivery,
            settings,
            app_name: app_name.into(),
        }
    }

    pub fn delivery(&self) -> &Arc<DeliveryService> {
        &self.delivery
    }

    /// Critical events ignore the auto-send toggle
    pub fn is_enabled(&self, tenant_id: &str, event: EventType) -> bool {
        event.priority().is_critical()
            || self
                .settings
                .snapshot(tenant_id)
                .auto_send_enabled(event.as_str())
    }

    /// Template send for `request`; caller variables win over the defaults
    pub fn build_request(&self, request: EventRequest) -> TemplateSendRequest {
        let EventRequest {
            event,
            tenant_id,
            channel,
            recipient,
            mut variables,
        } = request;

        variables
            .entry("userName")
            .or_insert_with(|| Value::String(recipient.name.clone().unwrap_or_default()));
        variables
            .entry("appName")
            .or_insert_with(|| Value::String(self.app_name.clone()));

        TemplateSendRequest {
            tenant_id,
            key: event.template_key().to_string(),
            channel,
            recipient: recipient.address,
            language: recipient.language,
            variables: Value::Object(variables),
            metadata: json!({
                "event": event.as_str(),
                "priority": event.priority().as_str(),
            }),
        }
    }

    /// Send the event now. `Ok(None)` means the tenant switched it off.
    pub async fn send(
        &self,
        request: EventRequest,
        ctx: &SendContext,
    ) -> Result<Option<Notification>, DeliveryError> {
        if !self.is_enabled(&request.tenant_id, request.event) {
            tracing::debug!(
                tenant_id = %request.tenant_id,
                event = %request.event,
                "Auto-send disabled for event, skipping"
            );
            return Ok(None);
        }

        let send = self.build_request(request);
        self.delivery
            .send_template_with_context(send, ctx)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::domain::audit::MemoryAuditSink;
    use crate::domain::notification::MemoryNotificationStore;
    use crate::domain::provider::{MockProvider, ProviderRegistry};
    use crate::domain::template::{DefaultCatalog, MemoryTemplateStore, TemplateResolver};
    use crate::domain::tenant::TenantConfig;

    fn adapter(settings: Arc<SettingsStore>, mock: Arc<MockProvider>) -> NotificationAdapter {
        let resolver = Arc::new(TemplateResolver::new(
            Arc::new(MemoryTemplateStore::new()),
            Arc::new(DefaultCatalog::builtin()),
            TenantConfig::default(),
            Arc::new(MemoryAuditSink::new()),
        ));
        let delivery = Arc::new(DeliveryService::new(
            Arc::new(MemoryNotificationStore::new()),
            resolver,
            ProviderRegistry::new().with_provider(mock),
            DeliveryConfig {
                retry_attempts: 1,
                retry_delay_ms: 1,
                critical_timeout_ms: 0,
            },
        ));
        NotificationAdapter::new(delivery, settings, "Acme")
    }

    #[test]
    fn test_build_request_fills_common_variables() {
        let adapter = adapter(
            Arc::new(SettingsStore::new()),
            Arc::new(MockProvider::new(ChannelType::Email)),
        );
        let request = EventRequest::new(
            EventType::PasswordReset,
            "acme",
            Recipient::new("ann@example.com").in_language("es"),
        )
        .with_var("link", "https://example.com/reset");

        let send = adapter.build_request(request);
        assert_eq!(send.key, "auth.password_reset");
        assert_eq!(send.language.as_deref(), Some("es"));
        assert_eq!(send.variables["userName"], "");
        assert_eq!(send.variables["appName"], "Acme");
        assert_eq!(send.metadata["priority"], "critical");
    }

    #[test]
    fn test_caller_variables_win() {
        let adapter = adapter(
            Arc::new(SettingsStore::new()),
            Arc::new(MockProvider::new(ChannelType::Email)),
        );
        let request = EventRequest::new(EventType::Welcome, "acme", Recipient::new("a@b.c").named("Ann"))
            .with_var("appName", "Globex");

        let send = adapter.build_request(request);
        assert_eq!(send.variables["userName"], "Ann");
        assert_eq!(send.variables["appName"], "Globex");
    }

    #[tokio::test]
    async fn test_auto_send_toggle() {
        let settings = Arc::new(SettingsStore::new());
        settings.set_auto_send("acme", "welcome", false);
        settings.set_auto_send("acme", "mfa_code", false);
        let mock = Arc::new(MockProvider::new(ChannelType::Email));
        let adapter = adapter(settings, mock.clone());

        let skipped = adapter
            .send(
                EventRequest::new(EventType::Welcome, "acme", Recipient::new("ann@example.com")),
                &SendContext::detached(),
            )
            .await
            .unwrap();
        assert!(skipped.is_none());

        // Critical events cannot be switched off
        let sent = adapter
            .send(
                EventRequest::new(EventType::MfaCode, "acme", Recipient::new("ann@example.com"))
                    .with_var("code", "123456"),
                &SendContext::detached(),
            )
            .await
            .unwrap();
        assert!(sent.is_some());
        assert_eq!(mock.call_count(), 1);
    }
}
