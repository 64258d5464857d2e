//! Per-tenant settings snapshots.
//!
//! Readers take an `Arc<TenantSettings>` and keep it for the duration of an
//! operation; writers build a modified copy and swap it in under the map's
//! shard lock, so a reader never observes a half-applied update.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::domain::notification::ChannelType;
use crate::domain::provider::ProviderConfig;

/// Immutable settings of one tenant
#[derive(Debug, Clone, Default, Serialize)]
pub struct TenantSettings {
    /// Incremented on every update
    pub version: u64,
    /// Provider configuration per channel; sensitive settings are encrypted
    pub providers: HashMap<ChannelType, ProviderConfig>,
    /// Auto-send toggles per event name; absent means enabled
    pub auto_send: HashMap<String, bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TenantSettings {
    pub fn provider(&self, channel: ChannelType) -> Option<&ProviderConfig> {
        self.providers.get(&channel)
    }

    pub fn auto_send_enabled(&self, event: &str) -> bool {
        self.auto_send.get(event).copied().unwrap_or(true)
    }
}

/// Store of tenant settings snapshots
#[derive(Default)]
pub struct SettingsStore {
    tenants: DashMap<String, Arc<TenantSettings>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; tenants without settings get an empty one
    pub fn snapshot(&self, tenant_id: &str) -> Arc<TenantSettings> {
        self.tenants
            .get(tenant_id)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default()
    }

    /// Apply `change` to a copy of the tenant's settings and publish it
    pub fn update<F>(&self, tenant_id: &str, change: F) -> Arc<TenantSettings>
    where
        F: FnOnce(&mut TenantSettings),
    {
        let mut entry = self
            .tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(TenantSettings::default()));

        let mut next = TenantSettings::clone(entry.value());
        change(&mut next);
        next.version += 1;
        next.updated_at = Some(Utc::now());

        let next = Arc::new(next);
        *entry.value_mut() = Arc::clone(&next);
        next
    }

    /// Store a provider configuration (callers pass the encrypted form)
    pub fn set_provider(&self, tenant_id: &str, config: ProviderConfig) -> Arc<TenantSettings> {
        self.update(tenant_id, |settings| {
            settings.providers.insert(config.channel, config);
        })
    }

    pub fn remove_provider(&self, tenant_id: &str, channel: ChannelType) -> Arc<TenantSettings> {
        self.update(tenant_id, |settings| {
            settings.providers.remove(&channel);
        })
    }

    pub fn set_auto_send(&self, tenant_id: &str, event: &str, enabled: bool) -> Arc<TenantSettings> {
        self.update(tenant_id, |settings| {
            settings.auto_send.insert(event.to_string(), enabled);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::ProviderKind;

    #[test]
    fn test_empty_snapshot() {
        let store = SettingsStore::new();
        let snapshot = store.snapshot("acme");
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.provider(ChannelType::Email).is_none());
        assert!(snapshot.auto_send_enabled("welcome"));
    }

    #[test]
    fn test_update_publishes_new_snapshot() {
        let store = SettingsStore::new();
        let before = store.snapshot("acme");

        store.set_provider("acme", ProviderConfig::new(ChannelType::Sms, ProviderKind::Mock));
        let after = store.set_auto_send("acme", "welcome", false);

        // Old snapshot is untouched
        assert!(before.provider(ChannelType::Sms).is_none());
        assert_eq!(after.version, 2);
        assert!(after.provider(ChannelType::Sms).is_some());
        assert!(!after.auto_send_enabled("welcome"));
        assert_eq!(store.snapshot("acme").version, 2);

        // Tenants are isolated
        assert!(store.snapshot("globex").auto_send_enabled("welcome"));
    }

    #[test]
    fn test_remove_provider() {
        let store = SettingsStore::new();
        store.set_provider("acme", ProviderConfig::new(ChannelType::Email, ProviderKind::Mock));
        let settings = store.remove_provider("acme", ChannelType::Email);
        assert!(settings.provider(ChannelType::Email).is_none());
    }
}
