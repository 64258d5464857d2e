//! Event types and their priority tiers.

use serde::{Deserialize, Serialize};

use crate::domain::notification::ChannelType;

/// Priority tier of an event.
///
/// Decides whether a dispatch blocks the caller and how failures surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Fire-and-forget; failures only reach telemetry
    Low,
    /// Detached; failures logged at info level
    Normal,
    /// Detached; failures logged at error level
    High,
    /// Synchronous; failures propagate to the caller
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Priority::Critical)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product events that trigger a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MfaCode,
    PhoneVerification,
    MagicLink,
    PasswordReset,
    EmailVerification,
    SuspiciousLogin,
    PasswordChanged,
    OrgInvite,
    Welcome,
    AccountDeactivated,
    AccountDeleted,
    OrgMemberAdded,
    OrgMemberRemoved,
    OrgRoleChanged,
    NewDeviceLogin,
    NewLocationLogin,
    SessionRevoked,
}

impl EventType {
    pub const ALL: [EventType; 17] = [
        EventType::MfaCode,
        EventType::PhoneVerification,
        EventType::MagicLink,
        EventType::PasswordReset,
        EventType::EmailVerification,
        EventType::SuspiciousLogin,
        EventType::PasswordChanged,
        EventType::OrgInvite,
        EventType::Welcome,
        EventType::AccountDeactivated,
        EventType::AccountDeleted,
        EventType::OrgMemberAdded,
        EventType::OrgMemberRemoved,
        EventType::OrgRoleChanged,
        EventType::NewDeviceLogin,
        EventType::NewLocationLogin,
        EventType::SessionRevoked,
    ];

    /// Event name, also the key of the tenant auto-send toggle
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MfaCode => "mfa_code",
            EventType::PhoneVerification => "phone_verification",
            EventType::MagicLink => "magic_link",
            EventType::PasswordReset => "password_reset",
            EventType::EmailVerification => "email_verification",
            EventType::SuspiciousLogin => "suspicious_login",
            EventType::PasswordChanged => "password_changed",
            EventType::OrgInvite => "org_invite",
            EventType::Welcome => "welcome",
            EventType::AccountDeactivated => "account_deactivated",
            EventType::AccountDeleted => "account_deleted",
            EventType::OrgMemberAdded => "org_member_added",
            EventType::OrgMemberRemoved => "org_member_removed",
            EventType::OrgRoleChanged => "org_role_changed",
            EventType::NewDeviceLogin => "new_device_login",
            EventType::NewLocationLogin => "new_location_login",
            EventType::SessionRevoked => "session_revoked",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            EventType::MfaCode
            | EventType::PhoneVerification
            | EventType::MagicLink
            | EventType::PasswordReset => Priority::Critical,
            EventType::EmailVerification
            | EventType::SuspiciousLogin
            | EventType::PasswordChanged
            | EventType::OrgInvite => Priority::High,
            EventType::Welcome
            | EventType::AccountDeactivated
            | EventType::AccountDeleted
            | EventType::OrgMemberAdded
            | EventType::OrgMemberRemoved
            | EventType::OrgRoleChanged => Priority::Normal,
            EventType::NewDeviceLogin
            | EventType::NewLocationLogin
            | EventType::SessionRevoked => Priority::Low,
        }
    }

    /// Template key rendered for this event
    pub fn template_key(&self) -> &'static str {
        match self {
            EventType::MfaCode => "auth.mfa_code",
            EventType::PhoneVerification => "auth.phone_verification",
            EventType::MagicLink => "auth.magic_link",
            EventType::PasswordReset => "auth.password_reset",
            EventType::EmailVerification => "auth.email_verification",
            EventType::Welcome => "auth.welcome",
            EventType::SuspiciousLogin => "security.suspicious_login",
            EventType::PasswordChanged => "security.password_changed",
            EventType::NewDeviceLogin => "security.new_device_login",
            EventType::NewLocationLogin => "security.new_location_login",
            EventType::SessionRevoked => "security.session_revoked",
            EventType::AccountDeactivated => "account.deactivated",
            EventType::AccountDeleted => "account.deleted",
            EventType::OrgInvite => "org.invite",
            EventType::OrgMemberAdded => "org.member_added",
            EventType::OrgMemberRemoved => "org.member_removed",
            EventType::OrgRoleChanged => "org.role_changed",
        }
    }

    /// Channel used when the caller does not choose one
    pub fn default_channel(&self) -> ChannelType {
        match self {
            EventType::PhoneVerification => ChannelType::Sms,
            _ => ChannelType::Email,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::template::DefaultCatalog;

    #[test]
    fn test_critical_events() {
        let critical: Vec<_> = EventType::ALL
            .iter()
            .filter(|e| e.priority().is_critical())
            .map(|e| e.as_str())
            .collect();
        assert_eq!(
            critical,
            vec!["mfa_code", "phone_verification", "magic_link", "password_reset"]
        );
    }

    #[test]
    fn test_every_event_has_a_default_template() {
        let catalog = DefaultCatalog::builtin();
        for event in EventType::ALL {
            assert!(
                catalog
                    .find(event.template_key(), event.default_channel())
                    .is_some(),
                "no default template for {}",
                event
            );
        }
    }

    #[test]
    fn test_priority_ordering_and_serde() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::from_str::<EventType>("\"org_invite\"").unwrap(),
            EventType::OrgInvite
        );
    }
}
