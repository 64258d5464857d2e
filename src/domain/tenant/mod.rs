//! Multi-tenant policy and settings.
//!
//! - `TenantConfig`: resolution policy (default language, lazy seeding,
//!   override mode) with per-tenant overrides
//! - `TenantContext`: validated tenant identity carried through a request
//! - `SettingsStore`: per-tenant provider configuration and auto-send
//!   toggles, held as immutable snapshots
//!
//! # Configuration
//!
//! - `ARA__TENANT__DEFAULT_LANGUAGE=en`
//! - `ARA__TENANT__SEED_DEFAULTS=true`
//! - `ARA__TENANT__ALLOW_OVERRIDES=true`

mod settings;

pub use settings::{SettingsStore, TenantSettings};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Tenant resolution policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Language used when a request names none, and as the fallback language
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Seed the default template catalog on first miss
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
    /// Authored templates may replace seeded defaults with the same key
    #[serde(default = "default_true")]
    pub allow_overrides: bool,
    /// Per-tenant policy overrides (tenant_id -> overrides)
    #[serde(default)]
    pub tenant_overrides: HashMap<String, TenantPolicyOverride>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            seed_defaults: true,
            allow_overrides: true,
            tenant_overrides: HashMap::new(),
        }
    }
}

/// Per-tenant policy override; unset fields inherit the global value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantPolicyOverride {
    pub default_language: Option<String>,
    pub seed_defaults: Option<bool>,
    pub allow_overrides: Option<bool>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

/// Effective policy for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantPolicy {
    pub default_language: String,
    pub seed_defaults: bool,
    pub allow_overrides: bool,
}

impl TenantConfig {
    /// Resolve the effective policy for a tenant
    pub fn policy_for(&self, tenant_id: &str) -> TenantPolicy {
        let overrides = self.tenant_overrides.get(tenant_id);

        TenantPolicy {
            default_language: overrides
                .and_then(|o| o.default_language.clone())
                .unwrap_or_else(|| self.default_language.clone()),
            seed_defaults: overrides
                .and_then(|o| o.seed_defaults)
                .unwrap_or(self.seed_defaults),
            allow_overrides: overrides
                .and_then(|o| o.allow_overrides)
                .unwrap_or(self.allow_overrides),
        }
    }
}

// ============================================================================
// Tenant Context
// ============================================================================

/// Validated tenant identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
}

impl TenantContext {
    /// Tenant ids are 1-64 characters of alphanumerics, dash or underscore
    pub fn new(tenant_id: impl Into<String>) -> Result<Self, TenantError> {
        let tenant_id = tenant_id.into();
        let valid = !tenant_id.is_empty()
            && tenant_id.len() <= 64
            && tenant_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid {
            return Err(TenantError::InvalidTenantId(tenant_id));
        }
        Ok(Self { tenant_id })
    }

    pub fn as_str(&self) -> &str {
        &self.tenant_id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = TenantConfig::default().policy_for("acme");
        assert_eq!(policy.default_language, "en");
        assert!(policy.seed_defaults);
        assert!(policy.allow_overrides);
    }

    #[test]
    fn test_policy_override() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "globex".to_string(),
            TenantPolicyOverride {
                default_language: Some("es".to_string()),
                seed_defaults: Some(false),
                allow_overrides: None,
            },
        );
        let config = TenantConfig {
            tenant_overrides: overrides,
            ..Default::default()
        };

        let globex = config.policy_for("globex");
        assert_eq!(globex.default_language, "es");
        assert!(!globex.seed_defaults);
        // Unset fields inherit
        assert!(globex.allow_overrides);

        assert_eq!(config.policy_for("acme").default_language, "en");
    }

    #[test]
    fn test_tenant_context_validation() {
        assert!(TenantContext::new("acme-corp_1").is_ok());
        assert!(TenantContext::new("").is_err());
        assert!(TenantContext::new("acme/../x").is_err());
        assert!(TenantContext::new("a".repeat(65)).is_err());
    }
}
