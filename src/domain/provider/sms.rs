//! SMS delivery through a Twilio-compatible gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::notification::ChannelType;

use super::{
    OutboundMessage, Provider, ProviderConfig, ProviderDeliveryStatus, ProviderError, SendReceipt,
};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com/2010-04-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// SMS gateway provider.
///
/// Settings: `account_sid`, `auth_token` (both required), `base_url`.
/// `from_address` holds the sending number.
pub struct SmsGatewayProvider {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

#[derive(Deserialize)]
struct MessageResource {
    sid: Option<String>,
    status: Option<String>,
}

impl SmsGatewayProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: config
                .setting_str("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            account_sid: config.require_str("account_sid")?.to_string(),
            auth_token: config.require_str("auth_token")?.to_string(),
            from_number: config.from_address.clone(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages", self.base_url, self.account_sid)
    }
}

fn map_status(status: &str) -> ProviderDeliveryStatus {
    match status {
        "accepted" | "queued" | "sending" | "scheduled" => ProviderDeliveryStatus::Queued,
        "sent" => ProviderDeliveryStatus::Sent,
        "delivered" | "read" => ProviderDeliveryStatus::Delivered,
        "undelivered" => ProviderDeliveryStatus::Bounced,
        "failed" | "canceled" => ProviderDeliveryStatus::Failed,
        _ => ProviderDeliveryStatus::Unknown,
    }
}

#[async_trait]
impl Provider for SmsGatewayProvider {
    fn name(&self) -> &str {
        "sms_gateway"
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Sms
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if !self.from_number.starts_with('+') {
            return Err(ProviderError::InvalidConfig(
                "sms sender must be an E.164 number".to_string(),
            ));
        }
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, ProviderError> {
        let form = [
            ("To", message.to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", message.body.as_str()),
        ];

        // The account id is part of the URL; keep it out of error messages
        let response = self
            .client
            .post(format!("{}.json", self.messages_url()))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(ProviderError::Rejected(format!(
                "SMS gateway returned {}: {}",
                status, error_body
            )));
        }

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| ProviderError::Http(e.without_url()))?;
        Ok(SendReceipt {
            message_id: resource.sid,
        })
    }

    async fn status(&self, message_id: &str) -> Result<ProviderDeliveryStatus, ProviderError> {
        let resource: MessageResource = self
            .client
            .get(format!("{}/{}.json", self.messages_url(), message_id))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::Http(e.without_url()))?
            .json()
            .await
            .map_err(|e| ProviderError::Http(e.without_url()))?;

        Ok(resource
            .status
            .as_deref()
            .map(map_status)
            .unwrap_or(ProviderDeliveryStatus::Unknown))
    }
}
