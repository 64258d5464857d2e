//! Channel providers.
//!
//! A [`Provider`] transmits one rendered message over a channel. The
//! [`ProviderRegistry`] holds the process-wide providers built at startup;
//! tenant-specific configurations are turned into providers on demand with
//! [`build_provider`].

mod config;
mod http_email;
mod mock;
mod registry;
mod sms;
mod smtp;

pub use config::{ProviderConfig, ProviderKind};
pub use http_email::HttpEmailProvider;
pub use mock::{MockBehavior, MockProvider};
pub use registry::{build_provider, ProviderRegistry};
pub use sms::SmsGatewayProvider;
pub use smtp::SmtpProvider;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::notification::{ChannelType, NotificationStatus};

/// Provider-level failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider rejected the message: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Message build error: {0}")]
    Build(String),

    #[error("Provider {0} does not support status queries")]
    Unsupported(String),
}

/// A fully rendered message ready for hand-off
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub channel: ChannelType,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Provider acknowledgement of a hand-off
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Delivery state reported by a provider status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderDeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Bounced,
    Failed,
    Unknown,
}

impl ProviderDeliveryStatus {
    /// Record status the report settles on, if it settles on one
    pub fn as_notification_status(&self) -> Option<NotificationStatus> {
        match self {
            ProviderDeliveryStatus::Delivered => Some(NotificationStatus::Delivered),
            ProviderDeliveryStatus::Bounced | ProviderDeliveryStatus::Failed => {
                Some(NotificationStatus::Bounced)
            }
            _ => None,
        }
    }
}

/// A channel provider.
///
/// Implementations hold their own (decrypted) configuration and must be safe
/// to share between tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier, e.g. `smtp`
    fn name(&self) -> &str;

    /// Channel this provider serves
    fn channel(&self) -> ChannelType;

    /// Check that the configuration is complete enough to attempt a send
    fn validate_config(&self) -> Result<(), ProviderError>;

    /// Transmit one message
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, ProviderError>;

    /// Query delivery status of a previously sent message
    async fn status(&self, _message_id: &str) -> Result<ProviderDeliveryStatus, ProviderError> {
        Err(ProviderError::Unsupported(self.name().to_string()))
    }
}
