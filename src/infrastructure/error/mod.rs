use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::is_production;
use crate::dispatch::DispatchError;
use crate::domain::notification::DeliveryError;
use crate::domain::provider::ProviderError;
use crate::domain::store::StoreError;
use crate::domain::template::TemplateError;
use crate::domain::tenant::TenantError;
use crate::domain::vault::VaultError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Render(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "RENDER_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::RateLimited(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                msg.clone(),
                msg.clone(),
            ),
            // Provider and vault errors may echo configuration; never forward them
            AppError::Provider(e) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                "Provider request failed".to_string(),
                e.clone(),
            ),
            AppError::Encryption(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ENCRYPTION_ERROR",
                "Provider configuration unavailable".to_string(),
                e.clone(),
            ),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, log_msg)
            }
        };

        // Always log the detailed error server-side
        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::debug!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) | StoreError::Stale(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(msg) => AppError::NotFound(msg),
            TemplateError::AlreadyExists(msg) => AppError::Conflict(msg),
            TemplateError::InvalidKey(msg) | TemplateError::InvalidTemplate(msg) => {
                AppError::Validation(msg)
            }
            TemplateError::Render(e) => AppError::Render(e.message),
            TemplateError::Store(e) => e.into(),
        }
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        AppError::Encryption(err.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidConfig(msg) => AppError::Validation(msg),
            other => AppError::Provider(other.to_string()),
        }
    }
}

impl From<TenantError> for AppError {
    fn from(err: TenantError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::TemplateNotFound(msg) => AppError::NotFound(msg),
            DeliveryError::NotificationNotFound(id) => {
                AppError::NotFound(format!("notification {}", id))
            }
            DeliveryError::Render(e) => AppError::Render(e.message),
            DeliveryError::Validation(msg) => AppError::Validation(msg),
            DeliveryError::InvalidTransition(e) => AppError::Conflict(e.to_string()),
            DeliveryError::ProviderNotConfigured(channel) => {
                AppError::Validation(format!("no provider configured for {}", channel))
            }
            DeliveryError::InvalidProviderConfig(msg) => AppError::Validation(msg),
            DeliveryError::RateLimited { channel, .. } => {
                AppError::RateLimited(format!("send rate exceeded for {}", channel))
            }
            DeliveryError::ConfigDecryption(e) => AppError::Encryption(e.to_string()),
            e @ DeliveryError::ProviderSendFailure { .. } => AppError::Provider(e.to_string()),
            e @ DeliveryError::Cancelled(_) => AppError::Internal(e.to_string()),
            DeliveryError::Store(e) => e.into(),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Delivery(e) => e.into(),
            DispatchError::Validation(msg) => AppError::Validation(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::ChannelType;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::Render("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::Provider("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Encryption("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_template_error_conversion() {
        assert!(matches!(
            AppError::from(TemplateError::NotFound("k".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(TemplateError::AlreadyExists("k".into())),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn test_delivery_error_conversion() {
        assert!(matches!(
            AppError::from(DeliveryError::ProviderNotConfigured(ChannelType::Sms)),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(DeliveryError::ConfigDecryption(VaultError::PlaceholderKey)),
            AppError::Encryption(_)
        ));
    }
}
