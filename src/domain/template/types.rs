//! Template records and request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::notification::ChannelType;
use crate::domain::store::StoreError;

use super::render::RenderError;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid template key: {0}")]
    InvalidKey(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Template storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Natural composite key of a template
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateIdentity {
    pub tenant_id: String,
    pub key: String,
    pub channel: ChannelType,
    pub language: String,
}

impl TemplateIdentity {
    pub fn new(
        tenant_id: impl Into<String>,
        key: impl Into<String>,
        channel: ChannelType,
        language: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            key: key.into(),
            channel,
            language: language.into(),
        }
    }

    /// Same identity in another language
    pub fn with_language(&self, language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for TemplateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.tenant_id, self.key, self.channel, self.language
        )
    }
}

/// A notification template owned by a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub tenant_id: String,

    /// Symbolic purpose, e.g. `auth.welcome`
    pub key: String,
    pub channel: ChannelType,
    pub language: String,

    /// Human-readable name
    pub name: String,

    /// Subject pattern (ignored for SMS)
    #[serde(default)]
    pub subject: String,

    /// Body pattern
    pub body: String,

    /// Declared variable names
    #[serde(default)]
    pub variables: Vec<String>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    pub active: bool,

    /// Seeded from the default catalog rather than authored
    pub is_default: bool,

    /// A seeded default that the tenant has since edited
    pub is_modified: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn identity(&self) -> TemplateIdentity {
        TemplateIdentity::new(
            self.tenant_id.clone(),
            self.key.clone(),
            self.channel,
            self.language.clone(),
        )
    }

    /// Validate the template
    pub fn validate(&self) -> TemplateResult<()> {
        validate_key(&self.key)?;

        if self.language.is_empty()
            || self.language.len() > 16
            || !self
                .language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TemplateError::InvalidTemplate(format!(
                "Invalid language tag: {:?}",
                self.language
            )));
        }

        if self.name.is_empty() || self.name.len() > 256 {
            return Err(TemplateError::InvalidTemplate(
                "Name must be 1-256 characters".to_string(),
            ));
        }

        if self.body.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "Body must not be empty".to_string(),
            ));
        }

        if self.channel == ChannelType::Email && self.subject.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "Email templates require a subject".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate a template key (alphanumeric, dot, dash, underscore)
pub fn validate_key(key: &str) -> TemplateResult<()> {
    if key.is_empty() || key.len() > 128 {
        return Err(TemplateError::InvalidKey(
            "Key must be 1-128 characters".to_string(),
        ));
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(TemplateError::InvalidKey(
            "Key must contain only alphanumeric, dot, dash, or underscore".to_string(),
        ));
    }

    Ok(())
}

/// Request to author a new template
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub key: String,
    pub channel: ChannelType,

    /// Defaults to the tenant's default language
    pub language: Option<String>,
    pub name: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CreateTemplateRequest {
    pub fn into_template(self, tenant_id: &str, default_language: &str) -> Template {
        let now = Utc::now();
        Template {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            key: self.key,
            channel: self.channel,
            language: self
                .language
                .unwrap_or_else(|| default_language.to_string()),
            name: self.name,
            subject: self.subject,
            body: self.body,
            variables: self.variables,
            metadata: self.metadata,
            active: true,
            is_default: false,
            is_modified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to edit an existing template
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub variables: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
    pub active: Option<bool>,
}

impl UpdateTemplateRequest {
    /// Whether the edit touches rendered content
    pub fn changes_content(&self) -> bool {
        self.subject.is_some() || self.body.is_some()
    }
}

/// Request body for rendering a preview
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub variables: serde_json::Value,
}

/// Rendered subject and body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Response for listing templates
#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(key: &str, channel: ChannelType) -> Template {
        CreateTemplateRequest {
            key: key.to_string(),
            channel,
            language: None,
            name: "Test".to_string(),
            subject: "Hello".to_string(),
            body: "Hello {{ name }}".to_string(),
            variables: vec!["name".to_string()],
            metadata: serde_json::Value::Null,
        }
        .into_template("acme", "en")
    }

    #[test]
    fn test_template_validation_valid() {
        assert!(template("auth.welcome", ChannelType::Email).validate().is_ok());
    }

    #[test]
    fn test_template_validation_invalid_key_chars() {
        assert!(matches!(
            template("auth/welcome", ChannelType::Email).validate(),
            Err(TemplateError::InvalidKey(_))
        ));
        assert!(matches!(
            template("", ChannelType::Email).validate(),
            Err(TemplateError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_email_requires_subject_sms_does_not() {
        let mut email = template("auth.welcome", ChannelType::Email);
        email.subject.clear();
        assert!(matches!(
            email.validate(),
            Err(TemplateError::InvalidTemplate(_))
        ));

        let mut sms = template("auth.mfa_code", ChannelType::Sms);
        sms.subject.clear();
        assert!(sms.validate().is_ok());
    }

    #[test]
    fn test_create_request_uses_default_language() {
        let t = template("auth.welcome", ChannelType::Email);
        assert_eq!(t.language, "en");
        assert!(!t.is_default);
        assert!(t.active);
    }
}
