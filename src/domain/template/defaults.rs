//! Built-in default templates.
//!
//! Seeded into a tenant's store on the first resolution miss. Seeded rows
//! carry `is_default = true` and are written in the tenant's default language.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::notification::ChannelType;

use super::types::Template;

/// One compiled-in template
#[derive(Debug, Clone, Copy)]
pub struct DefaultTemplate {
    pub key: &'static str,
    pub channel: ChannelType,
    pub name: &'static str,
    pub subject: &'static str,
    pub body: &'static str,
    pub variables: &'static [&'static str],
}

impl DefaultTemplate {
    /// Materialise for a tenant
    pub fn instantiate(&self, tenant_id: &str, language: &str) -> Template {
        let now = Utc::now();
        Template {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            key: self.key.to_string(),
            channel: self.channel,
            language: language.to_string(),
            name: self.name.to_string(),
            subject: self.subject.to_string(),
            body: self.body.to_string(),
            variables: self.variables.iter().map(|v| v.to_string()).collect(),
            metadata: serde_json::Value::Null,
            active: true,
            is_default: true,
            is_modified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The set of default templates
#[derive(Debug, Clone)]
pub struct DefaultCatalog {
    entries: Vec<DefaultTemplate>,
}

impl Default for DefaultCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DefaultCatalog {
    pub fn new(entries: Vec<DefaultTemplate>) -> Self {
        Self { entries }
    }

    /// Catalog covering every dispatchable event
    pub fn builtin() -> Self {
        Self::new(BUILTIN.to_vec())
    }

    pub fn entries(&self) -> &[DefaultTemplate] {
        &self.entries
    }

    pub fn find(&self, key: &str, channel: ChannelType) -> Option<&DefaultTemplate> {
        self.entries
            .iter()
            .find(|e| e.key == key && e.channel == channel)
    }

    /// All templates for a tenant
    pub fn instantiate_all(&self, tenant_id: &str, language: &str) -> Vec<Template> {
        self.entries
            .iter()
            .map(|e| e.instantiate(tenant_id, language))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const EMAIL: ChannelType = ChannelType::Email;
const SMS: ChannelType = ChannelType::Sms;

const BUILTIN: &[DefaultTemplate] = &[
    // Authentication
    DefaultTemplate {
        key: "auth.mfa_code",
        channel: EMAIL,
        name: "MFA code",
        subject: "Your {{ appName }} verification code",
        body: "Your verification code is {{ code }}.\n\nIt expires in {{ expiresInMinutes | default(value=10) }} minutes. If you did not try to sign in, change your password.",
        variables: &["code", "appName", "expiresInMinutes"],
    },
    DefaultTemplate {
        key: "auth.mfa_code",
        channel: SMS,
        name: "MFA code (SMS)",
        subject: "",
        body: "{{ appName }}: your verification code is {{ code }}",
        variables: &["code", "appName"],
    },
    DefaultTemplate {
        key: "auth.phone_verification",
        channel: SMS,
        name: "Phone verification",
        subject: "",
        body: "{{ appName }}: use {{ code }} to verify your phone number",
        variables: &["code", "appName"],
    },
    DefaultTemplate {
        key: "auth.magic_link",
        channel: EMAIL,
        name: "Magic link",
        subject: "Sign in to {{ appName }}",
        body: "Hi {{ userName | default_if_empty(value=\"there\") }},\n\nUse this link to sign in: {{ link }}\n\nThe link expires in {{ expiresInMinutes | default(value=15) }} minutes.",
        variables: &["userName", "appName", "link", "expiresInMinutes"],
    },
    DefaultTemplate {
        key: "auth.password_reset",
        channel: EMAIL,
        name: "Password reset",
        subject: "Reset your {{ appName }} password",
        body: "Hi {{ userName | default_if_empty(value=\"there\") }},\n\nReset your password here: {{ link }}\n\nIf you did not request a reset, ignore this email.",
        variables: &["userName", "appName", "link"],
    },
    DefaultTemplate {
        key: "auth.email_verification",
        channel: EMAIL,
        name: "Email verification",
        subject: "Verify your email for {{ appName }}",
        body: "Hi {{ userName | default_if_empty(value=\"there\") }},\n\nConfirm your email address: {{ link }}",
        variables: &["userName", "appName", "link"],
    },
    DefaultTemplate {
        key: "auth.welcome",
        channel: EMAIL,
        name: "Welcome",
        subject: "Welcome to {{ appName }}",
        body: "Hi {{ userName }},\n\nWelcome to {{ appName }}! Your account is ready.",
        variables: &["userName", "appName"],
    },
    // Security alerts
    DefaultTemplate {
        key: "security.suspicious_login",
        channel: EMAIL,
        name: "Suspicious login",
        subject: "Unusual sign-in to your {{ appName }} account",
        body: "Hi {{ userName }},\n\nWe noticed a sign-in from {{ ipAddress | default(value=\"an unknown address\") }}{% if location %} near {{ location }}{% endif %}. If this wasn't you, reset your password immediately.",
        variables: &["userName", "appName", "ipAddress", "location"],
    },
    DefaultTemplate {
        key: "security.password_changed",
        channel: EMAIL,
        name: "Password changed",
        subject: "Your {{ appName }} password was changed",
        body: "Hi {{ userName }},\n\nYour password was just changed. If you did not do this, contact support.",
        variables: &["userName", "appName"],
    },
    DefaultTemplate {
        key: "security.new_device_login",
        channel: EMAIL,
        name: "New device sign-in",
        subject: "New sign-in to {{ appName }}",
        body: "Hi {{ userName }},\n\nYour account was used on a new device{% if device %} ({{ device }}){% endif %}.",
        variables: &["userName", "appName", "device"],
    },
    DefaultTemplate {
        key: "security.new_location_login",
        channel: EMAIL,
        name: "New location sign-in",
        subject: "Sign-in from a new location",
        body: "Hi {{ userName }},\n\nYour {{ appName }} account was used from {{ location | default(value=\"a new location\") }}.",
        variables: &["userName", "appName", "location"],
    },
    DefaultTemplate {
        key: "security.session_revoked",
        channel: EMAIL,
        name: "Session revoked",
        subject: "A {{ appName }} session was signed out",
        body: "Hi {{ userName }},\n\nA session{% if device %} on {{ device }}{% endif %} was signed out of your account.",
        variables: &["userName", "appName", "device"],
    },
    // Account lifecycle
    DefaultTemplate {
        key: "account.deactivated",
        channel: EMAIL,
        name: "Account deactivated",
        subject: "Your {{ appName }} account was deactivated",
        body: "Hi {{ userName }},\n\nYour account has been deactivated.",
        variables: &["userName", "appName"],
    },
    DefaultTemplate {
        key: "account.deleted",
        channel: EMAIL,
        name: "Account deleted",
        subject: "Your {{ appName }} account was deleted",
        body: "Hi {{ userName }},\n\nYour account and its data have been deleted.",
        variables: &["userName", "appName"],
    },
    // Organizations
    DefaultTemplate {
        key: "org.invite",
        channel: EMAIL,
        name: "Organization invite",
        subject: "{{ inviterName }} invited you to {{ orgName }}",
        body: "{{ inviterName }} invited you to join {{ orgName }} on {{ appName }}.\n\nAccept the invitation: {{ link }}",
        variables: &["inviterName", "orgName", "appName", "link"],
    },
    DefaultTemplate {
        key: "org.member_added",
        channel: EMAIL,
        name: "Added to organization",
        subject: "You were added to {{ orgName }}",
        body: "Hi {{ userName }},\n\nYou are now a member of {{ orgName }}{% if role %} as {{ role }}{% endif %}.",
        variables: &["userName", "orgName", "role"],
    },
    DefaultTemplate {
        key: "org.member_removed",
        channel: EMAIL,
        name: "Removed from organization",
        subject: "You were removed from {{ orgName }}",
        body: "Hi {{ userName }},\n\nYou are no longer a member of {{ orgName }}.",
        variables: &["userName", "orgName"],
    },
    DefaultTemplate {
        key: "org.role_changed",
        channel: EMAIL,
        name: "Organization role changed",
        subject: "Your role in {{ orgName }} changed",
        body: "Hi {{ userName }},\n\nYour role in {{ orgName }} is now {{ role | upper }}.",
        variables: &["userName", "orgName", "role"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::template::render::render_template;
    use serde_json::json;

    #[test]
    fn test_builtin_templates_are_valid() {
        for entry in DefaultCatalog::builtin().entries() {
            let template = entry.instantiate("acme", "en");
            assert!(template.validate().is_ok(), "{} {}", entry.key, entry.channel);
            assert!(template.is_default);
        }
    }

    #[test]
    fn test_builtin_templates_render_with_declared_variables() {
        for entry in DefaultCatalog::builtin().entries() {
            let vars: serde_json::Map<String, serde_json::Value> = entry
                .variables
                .iter()
                .map(|v| (v.to_string(), json!("x")))
                .collect();
            let rendered = render_template(&entry.instantiate("acme", "en"), &vars.into());
            assert!(rendered.is_ok(), "{}: {:?}", entry.key, rendered.err());
        }
    }

    #[test]
    fn test_identities_unique() {
        let catalog = DefaultCatalog::builtin();
        let mut seen = std::collections::HashSet::new();
        for entry in catalog.entries() {
            assert!(seen.insert((entry.key, entry.channel)), "duplicate {}", entry.key);
        }
        assert!(catalog.find("auth.mfa_code", ChannelType::Sms).is_some());
        assert!(catalog.find("auth.welcome", ChannelType::Sms).is_none());
    }

    #[test]
    fn test_welcome_renders() {
        let catalog = DefaultCatalog::builtin();
        let template = catalog
            .find("auth.welcome", ChannelType::Email)
            .unwrap()
            .instantiate("acme", "en");
        let out = render_template(&template, &json!({"userName": "Ann", "appName": "Acme"})).unwrap();
        assert_eq!(out.subject, "Welcome to Acme");
        assert!(out.body.contains("Ann"));
    }
}
