//! API layer - HTTP endpoint handlers organized by domain.

mod events;
mod health;
mod metrics;
mod notification;
mod provider;
mod routes;
mod template;

pub use events::{dispatch_event, set_auto_send, DispatchEventRequest, DispatchEventResponse};
pub use health::health;
pub use metrics::prometheus_metrics;
pub use provider::{ProviderConfigRequest, ProviderConfigView};
pub use routes::{api_routes, public_routes};

use axum::http::HeaderMap;

use crate::domain::tenant::TenantContext;
use crate::error::Result;

/// Header naming who made a change, for the audit trail
pub const ACTOR_HEADER: &str = "X-Actor";

const DEFAULT_ACTOR: &str = "api";

fn tenant(tenant_id: String) -> Result<TenantContext> {
    Ok(TenantContext::new(tenant_id)?)
}

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_actor_from_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor(&headers), "api");

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("ops@acme"));
        assert_eq!(actor(&headers), "ops@acme");
    }

    #[test]
    fn test_tenant_validation() {
        assert!(tenant("acme-prod".to_string()).is_ok());
        assert!(tenant("bad tenant".to_string()).is_err());
    }
}
