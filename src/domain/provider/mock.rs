//! In-process provider that records messages instead of sending them.
//!
//! Used by tests and by local development profiles. Behaviour can be scripted
//! to exercise the retry path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::notification::ChannelType;

use super::{
    OutboundMessage, Provider, ProviderConfig, ProviderDeliveryStatus, ProviderError, SendReceipt,
};

/// Scripted outcome of mock sends
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    Succeed,
    AlwaysFail,
    /// Fail the first `n` calls, then succeed
    FailTimes(u32),
    /// Fail with the given probability
    FailRate(f64),
}

pub struct MockProvider {
    channel: ChannelType,
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: AtomicU32,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MockProvider {
    pub fn new(channel: ChannelType) -> Self {
        Self {
            channel,
            behavior: MockBehavior::Succeed,
            delay: None,
            calls: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Sleep before answering each send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Settings: `behavior` (`succeed` | `fail`), `fail_times`, `fail_rate`,
    /// `delay_ms`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let behavior = if let Some(n) = config.setting_u64("fail_times") {
            MockBehavior::FailTimes(n as u32)
        } else if let Some(rate) = config.settings.get("fail_rate").and_then(|v| v.as_f64()) {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ProviderError::InvalidConfig(
                    "fail_rate must be between 0 and 1".to_string(),
                ));
            }
            MockBehavior::FailRate(rate)
        } else {
            match config.setting_str("behavior").unwrap_or("succeed") {
                "succeed" => MockBehavior::Succeed,
                "fail" => MockBehavior::AlwaysFail,
                other => {
                    return Err(ProviderError::InvalidConfig(format!(
                        "unknown mock behavior: {}",
                        other
                    )))
                }
            }
        };

        let mut provider = Self::new(config.channel).with_behavior(behavior);
        if let Some(ms) = config.setting_u64("delay_ms") {
            provider = provider.with_delay(Duration::from_millis(ms));
        }
        Ok(provider)
    }

    /// Number of send calls, successful or not
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages accepted so far
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    fn should_fail(&self, call: u32) -> bool {
        match self.behavior {
            MockBehavior::Succeed => false,
            MockBehavior::AlwaysFail => true,
            MockBehavior::FailTimes(n) => call <= n,
            MockBehavior::FailRate(rate) => rand::random::<f64>() < rate,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn channel(&self) -> ChannelType {
        self.channel
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail(call) {
            return Err(ProviderError::Rejected(format!(
                "mock failure on attempt {}",
                call
            )));
        }

        self.sent.lock().await.push(message.clone());
        Ok(SendReceipt {
            message_id: Some(format!("mock-{}", Uuid::new_v4())),
        })
    }

    async fn status(&self, message_id: &str) -> Result<ProviderDeliveryStatus, ProviderError> {
        Ok(if message_id.starts_with("mock-") {
            ProviderDeliveryStatus::Delivered
        } else {
            ProviderDeliveryStatus::Unknown
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::ProviderKind;

    fn message() -> OutboundMessage {
        OutboundMessage {
            channel: ChannelType::Email,
            to: "ann@example.com".to_string(),
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_records_messages() {
        let provider = MockProvider::new(ChannelType::Email);
        let receipt = provider.send(&message()).await.unwrap();
        assert!(receipt.message_id.unwrap().starts_with("mock-"));
        assert_eq!(provider.sent().await.len(), 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_times_then_succeed() {
        let provider = MockProvider::new(ChannelType::Email).with_behavior(MockBehavior::FailTimes(2));
        assert!(provider.send(&message()).await.is_err());
        assert!(provider.send(&message()).await.is_err());
        assert!(provider.send(&message()).await.is_ok());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.sent().await.len(), 1);
    }

    #[test]
    fn test_from_config() {
        let cfg = ProviderConfig::new(ChannelType::Sms, ProviderKind::Mock)
            .with_setting("behavior", "fail");
        let provider = MockProvider::from_config(&cfg).unwrap();
        assert_eq!(provider.behavior, MockBehavior::AlwaysFail);
        assert_eq!(provider.channel(), ChannelType::Sms);

        let bad = ProviderConfig::new(ChannelType::Sms, ProviderKind::Mock)
            .with_setting("fail_rate", 2.0);
        assert!(MockProvider::from_config(&bad).is_err());
    }
}
