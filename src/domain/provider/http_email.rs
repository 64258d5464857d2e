//! Transactional email over an HTTP API (Resend-compatible).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::notification::ChannelType;

use super::{
    OutboundMessage, Provider, ProviderConfig, ProviderDeliveryStatus, ProviderError, SendReceipt,
};

const DEFAULT_ENDPOINT: &str = "https://api.resend.com/emails";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP email provider.
///
/// Settings: `api_key` (required), `endpoint` (defaults to Resend).
pub struct HttpEmailProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct EmailStatusResponse {
    last_event: Option<String>,
}

impl HttpEmailProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let from = if config.from_name.is_empty() {
            config.from_address.clone()
        } else {
            format!("{} <{}>", config.from_name, config.from_address)
        };

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            endpoint: config
                .setting_str("endpoint")
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            api_key: config.require_str("api_key")?.to_string(),
            from,
        })
    }
}

fn map_last_event(event: &str) -> ProviderDeliveryStatus {
    match event {
        "queued" | "scheduled" => ProviderDeliveryStatus::Queued,
        "sent" | "delivery_delayed" => ProviderDeliveryStatus::Sent,
        "delivered" | "opened" | "clicked" => ProviderDeliveryStatus::Delivered,
        "bounced" | "complained" => ProviderDeliveryStatus::Bounced,
        "failed" | "canceled" => ProviderDeliveryStatus::Failed,
        _ => ProviderDeliveryStatus::Unknown,
    }
}

#[async_trait]
impl Provider for HttpEmailProvider {
    fn name(&self) -> &str {
        "http_email"
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Email
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::InvalidConfig(format!("invalid endpoint: {}", e)))?;
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, ProviderError> {
        let payload = SendEmailBody {
            from: &self.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            text: &message.body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(ProviderError::Rejected(format!(
                "email API returned {}: {}",
                status, error_body
            )));
        }

        let body: SendEmailResponse = response.json().await?;
        Ok(SendReceipt {
            message_id: body.id,
        })
    }

    async fn status(&self, message_id: &str) -> Result<ProviderDeliveryStatus, ProviderError> {
        let response = self
            .client
            .get(format!("{}/{}", self.endpoint, message_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;

        let body: EmailStatusResponse = response.json().await?;
        Ok(body
            .last_event
            .as_deref()
            .map(map_last_event)
            .unwrap_or(ProviderDeliveryStatus::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::ProviderKind;

    #[test]
    fn test_from_config() {
        let cfg = ProviderConfig::new(ChannelType::Email, ProviderKind::HttpEmail)
            .with_sender("noreply@acme.test", "Acme")
            .with_setting("api_key", "re_123")
            .with_setting("endpoint", "https://mail.acme.test/v1/emails/");
        let provider = HttpEmailProvider::from_config(&cfg).unwrap();
        assert_eq!(provider.endpoint, "https://mail.acme.test/v1/emails");
        assert_eq!(provider.from, "Acme <noreply@acme.test>");
        assert!(provider.validate_config().is_ok());
    }

    #[test]
    fn test_api_key_required() {
        let cfg = ProviderConfig::new(ChannelType::Email, ProviderKind::HttpEmail)
            .with_sender("noreply@acme.test", "");
        assert!(HttpEmailProvider::from_config(&cfg).is_err());
    }

    #[test]
    fn test_last_event_mapping() {
        assert_eq!(map_last_event("delivered"), ProviderDeliveryStatus::Delivered);
        assert_eq!(map_last_event("bounced"), ProviderDeliveryStatus::Bounced);
        assert_eq!(map_last_event("sent"), ProviderDeliveryStatus::Sent);
        assert_eq!(map_last_event("something"), ProviderDeliveryStatus::Unknown);
    }
}
