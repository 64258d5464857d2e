//! Email delivery over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use crate::domain::notification::ChannelType;

use super::{OutboundMessage, Provider, ProviderConfig, ProviderError, SendReceipt};

/// Default SMTP port (STARTTLS)
const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTP email provider.
///
/// Settings: `host` (required), `port` (587), `username`, `password`,
/// `tls` (STARTTLS, default true).
pub struct SmtpProvider {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    tls: bool,
    from_address: String,
    from_name: String,
}

impl SmtpProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            host: config.require_str("host")?.to_string(),
            port: config
                .setting_u64("port")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            username: config.setting_str("username").map(str::to_string),
            password: config.setting_str("password").map(str::to_string),
            tls: config.setting_bool("tls").unwrap_or(true),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn sender(&self) -> Result<Mailbox, ProviderError> {
        let name = (!self.from_name.is_empty()).then(|| self.from_name.clone());
        Ok(Mailbox::new(name, self.from_address.parse()?))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ProviderError> {
        let mut builder = if self.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
        }
        .port(self.port);

        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Provider for SmtpProvider {
    fn name(&self) -> &str {
        "smtp"
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Email
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        self.sender()?;
        if self.username.is_some() != self.password.is_some() {
            return Err(ProviderError::InvalidConfig(
                "smtp username and password must be set together".to_string(),
            ));
        }
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, ProviderError> {
        let domain = self
            .from_address
            .rsplit_once('@')
            .map(|(_, d)| d)
            .unwrap_or("localhost");
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

        let email = Message::builder()
            .from(self.sender()?)
            .to(message.to.parse()?)
            .subject(message.subject.as_str())
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| ProviderError::Build(e.to_string()))?;

        let response = self.transport()?.send(email).await?;
        if !response.is_positive() {
            return Err(ProviderError::Rejected(format!(
                "SMTP server answered {}",
                response.code()
            )));
        }

        tracing::debug!(host = %self.host, message_id = %message_id, "SMTP hand-off accepted");

        Ok(SendReceipt {
            message_id: Some(message_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::ProviderKind;

    fn config() -> ProviderConfig {
        ProviderConfig::new(ChannelType::Email, ProviderKind::Smtp)
            .with_sender("noreply@acme.test", "Acme")
            .with_setting("host", "smtp.acme.test")
    }

    #[test]
    fn test_defaults() {
        let provider = SmtpProvider::from_config(&config()).unwrap();
        assert_eq!(provider.port, 587);
        assert!(provider.tls);
        assert!(provider.validate_config().is_ok());
    }

    #[test]
    fn test_missing_host() {
        let cfg = ProviderConfig::new(ChannelType::Email, ProviderKind::Smtp)
            .with_sender("noreply@acme.test", "");
        assert!(matches!(
            SmtpProvider::from_config(&cfg),
            Err(ProviderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let provider = SmtpProvider::from_config(&config().with_setting("username", "bot")).unwrap();
        assert!(provider.validate_config().is_err());
    }

    #[test]
    fn test_bad_sender_address() {
        let cfg = config().with_sender("not-an-email", "");
        let provider = SmtpProvider::from_config(&cfg).unwrap();
        assert!(matches!(
            provider.validate_config(),
            Err(ProviderError::Address(_))
        ));
    }
}
