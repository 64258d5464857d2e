use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::notification::ChannelType;

use super::{
    HttpEmailProvider, MockProvider, Provider, ProviderConfig, ProviderError, ProviderKind,
    SmsGatewayProvider, SmtpProvider,
};

/// Build a provider from a plaintext (already decrypted) configuration
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    config.validate()?;

    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::Smtp => Arc::new(SmtpProvider::from_config(config)?),
        ProviderKind::HttpEmail => Arc::new(HttpEmailProvider::from_config(config)?),
        ProviderKind::SmsGateway => Arc::new(SmsGatewayProvider::from_config(config)?),
        ProviderKind::Mock => Arc::new(MockProvider::from_config(config)?),
    };
    provider.validate_config()?;

    Ok(provider)
}

/// Process-wide providers keyed by channel.
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ChannelType, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for its channel, replacing any previous one
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    /// Build a registry from configuration entries
    pub fn from_configs<'a>(
        configs: impl IntoIterator<Item = &'a ProviderConfig>,
    ) -> Result<Self, ProviderError> {
        configs
            .into_iter()
            .try_fold(Self::new(), |registry, config| {
                Ok(registry.with_provider(build_provider(config)?))
            })
    }

    pub fn get(&self, channel: ChannelType) -> Option<Arc<dyn Provider>> {
        self.providers.get(&channel).cloned()
    }

    /// `(channel, provider name)` pairs, for health output
    pub fn describe(&self) -> Vec<(ChannelType, String)> {
        let mut entries: Vec<_> = self
            .providers
            .iter()
            .map(|(channel, p)| (*channel, p.name().to_string()))
            .collect();
        entries.sort_by_key(|(channel, _)| channel.as_str());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_keyed_by_channel() {
        let registry = ProviderRegistry::from_configs(&[
            ProviderConfig::new(ChannelType::Email, ProviderKind::Mock),
            ProviderConfig::new(ChannelType::Sms, ProviderKind::Mock),
        ])
        .unwrap();

        assert_eq!(registry.get(ChannelType::Email).unwrap().channel(), ChannelType::Email);
        assert_eq!(registry.get(ChannelType::Sms).unwrap().channel(), ChannelType::Sms);
        assert_eq!(registry.describe().len(), 2);
    }

    #[test]
    fn test_build_rejects_incompatible_channel() {
        let cfg = ProviderConfig::new(ChannelType::Sms, ProviderKind::HttpEmail)
            .with_sender("noreply@acme.test", "")
            .with_setting("api_key", "k");
        assert!(build_provider(&cfg).is_err());
    }

    #[test]
    fn test_empty_registry() {
        assert!(ProviderRegistry::new().get(ChannelType::Email).is_none());
    }
}
