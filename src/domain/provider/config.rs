use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::notification::ChannelType;

use super::ProviderError;

/// Provider implementation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Smtp,
    HttpEmail,
    SmsGateway,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Smtp => "smtp",
            ProviderKind::HttpEmail => "http_email",
            ProviderKind::SmsGateway => "sms_gateway",
            ProviderKind::Mock => "mock",
        }
    }

    /// Whether this kind can deliver on `channel`
    pub fn supports(&self, channel: ChannelType) -> bool {
        match self {
            ProviderKind::Smtp | ProviderKind::HttpEmail => channel == ChannelType::Email,
            ProviderKind::SmsGateway => channel == ChannelType::Sms,
            ProviderKind::Mock => true,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider configuration for one channel.
///
/// Sensitive keys in `settings` are stored encrypted and must go through the
/// credential vault before a provider is built from this value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub channel: ChannelType,
    pub provider: ProviderKind,

    /// Sender address (email) or number (SMS)
    #[serde(default)]
    pub from_address: String,

    #[serde(default)]
    pub from_name: String,

    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl ProviderConfig {
    pub fn new(channel: ChannelType, provider: ProviderKind) -> Self {
        Self {
            channel,
            provider,
            from_address: String::new(),
            from_name: String::new(),
            settings: Map::new(),
        }
    }

    pub fn with_sender(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.from_address = address.into();
        self.from_name = name.into();
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// String setting, treating empty strings as absent
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.setting_str(key).ok_or_else(|| {
            ProviderError::InvalidConfig(format!("{} requires setting `{}`", self.provider, key))
        })
    }

    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        match self.settings.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn setting_bool(&self, key: &str) -> Option<bool> {
        match self.settings.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Check channel compatibility and sender identity
    pub fn validate(&self) -> Result<(), ProviderError> {
        if !self.provider.supports(self.channel) {
            return Err(ProviderError::InvalidConfig(format!(
                "provider {} cannot deliver on channel {}",
                self.provider, self.channel
            )));
        }
        if self.provider != ProviderKind::Mock && self.from_address.trim().is_empty() {
            return Err(ProviderError::InvalidConfig(
                "from_address is required".to_string(),
            ));
        }
        Ok(())
    }
}
