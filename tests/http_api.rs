//! HTTP surface tests
//!
//! Drive the router in-process with `tower::ServiceExt::oneshot`; storage is
//! in memory and the default providers are mocks.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use ara_dispatch::config::Settings;
use ara_dispatch::domain::notification::ChannelType;
use ara_dispatch::domain::provider::{ProviderConfig, ProviderKind};
use ara_dispatch::domain::vault::{CredentialVault, MASK};
use ara_dispatch::server::{create_app, AppState};

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.delivery.retry_delay_ms = 1;
    settings.providers.email = Some(ProviderConfig::new(ChannelType::Email, ProviderKind::Mock));
    settings.providers.sms = Some(ProviderConfig::new(ChannelType::Sms, ProviderKind::Mock));
    settings
}

fn app_with(settings: Settings) -> (Router, AppState) {
    let state = AppState::new(settings, CredentialVault::development(), None).unwrap();
    (create_app(state.clone()), state)
}

fn app() -> (Router, AppState) {
    app_with(settings())
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_storage_and_workers() {
    let (app, _) = app();
    let (status, body) = call(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["templates"], "memory");
    assert_eq!(body["encryption"]["placeholder_key"], true);
    assert!(body["workers"]["capacity"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = app();
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let mut settings = settings();
    settings.api.key = Some("s3cret".to_string());
    let (app, _) = app_with(settings);

    let (status, _) = call(&app, get("/api/v1/tenants/acme/templates")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri("/api/v1/tenants/acme/templates")
        .header("X-API-Key", "s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, authorized).await;
    assert_eq!(status, StatusCode::OK);

    // Health stays public
    let (status, _) = call(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_template_lifecycle() {
    let (app, _) = app();

    let (status, body) = call(&app, get("/api/v1/tenants/acme/templates")).await;
    assert_eq!(status, StatusCode::OK);
    let seeded = body["total"].as_u64().unwrap();
    assert!(seeded > 0);

    let (status, created) = call(
        &app,
        json_request(
            "POST",
            "/api/v1/tenants/acme/templates",
            json!({
                "key": "billing.receipt",
                "channel": "email",
                "name": "Receipt",
                "subject": "Receipt for {{ userName }}",
                "body": "Total: {{ total }}",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, preview) = call(
        &app,
        json_request(
            "POST",
            &format!("/api/v1/tenants/acme/templates/{}/preview", id),
            json!({ "variables": { "userName": "Ann", "total": "$5" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["subject"], "Receipt for Ann");
    assert_eq!(preview["body"], "Total: $5");

    let (status, _) = call(
        &app,
        json_request(
            "POST",
            &format!("/api/v1/tenants/acme/templates/{}/preview", id),
            json!({ "variables": {} }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/tenants/acme/templates/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, deactivated) = call(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deactivated["active"], false);
}

#[tokio::test]
async fn test_invalid_tenant_is_rejected() {
    let (app, _) = app();
    let (status, body) = call(&app, get("/api/v1/tenants/bad%20tenant/templates")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_provider_config_is_encrypted_and_masked() {
    let (app, state) = app();

    let (status, view) = call(
        &app,
        json_request(
            "PUT",
            "/api/v1/tenants/acme/providers/email",
            json!({
                "provider": "mock",
                "settings": { "api_key": "tenant-secret", "behavior": "succeed" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["settings"]["api_key"], MASK);
    assert_eq!(view["settings"]["behavior"], "succeed");

    let stored = state.tenant_settings.snapshot("acme");
    let stored = stored.provider(ChannelType::Email).unwrap();
    assert_ne!(stored.settings["api_key"], "tenant-secret");
    assert_eq!(
        state.vault.decrypt(&stored.settings).unwrap()["api_key"],
        "tenant-secret"
    );

    // Sending the mask back keeps the stored secret
    let (status, _) = call(
        &app,
        json_request(
            "PUT",
            "/api/v1/tenants/acme/providers/email",
            json!({
                "provider": "mock",
                "settings": { "api_key": MASK, "behavior": "succeed" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stored = state.tenant_settings.snapshot("acme");
    assert_eq!(
        state
            .vault
            .decrypt(&stored.provider(ChannelType::Email).unwrap().settings)
            .unwrap()["api_key"],
        "tenant-secret"
    );

    // A secret shaped like stored ciphertext is still sealed
    let (status, _) = call(
        &app,
        json_request(
            "PUT",
            "/api/v1/tenants/acme/providers/email",
            json!({
                "provider": "mock",
                "settings": { "api_key": "enc:v1:looks-sealed", "behavior": "succeed" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stored = state.tenant_settings.snapshot("acme");
    let settings = &stored.provider(ChannelType::Email).unwrap().settings;
    assert_ne!(settings["api_key"], "enc:v1:looks-sealed");
    assert_eq!(
        state.vault.decrypt(settings).unwrap()["api_key"],
        "enc:v1:looks-sealed"
    );

    let (status, result) = call(
        &app,
        json_request(
            "POST",
            "/api/v1/tenants/acme/providers/email/test",
            json!({ "recipient": "ops@acme.test" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], true);
    assert_eq!(result["provider"], "mock");
}

#[tokio::test]
async fn test_critical_event_is_sent_inline() {
    let (app, _) = app();

    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/api/v1/tenants/acme/events",
            json!({
                "event": "mfa_code",
                "recipient": { "address": "ann@example.com", "name": "Ann" },
                "variables": { "code": "123456" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "sent");
    assert_eq!(body["priority"], "critical");
    assert_eq!(body["notification"]["status"], "sent");

    let id = body["notification"]["id"].as_str().unwrap().to_string();
    let (status, fetched) = call(&app, get(&format!("/api/v1/tenants/acme/notifications/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(fetched["body"].as_str().unwrap().contains("123456"));
}

#[tokio::test]
async fn test_detached_event_is_queued() {
    let (app, state) = app();

    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/api/v1/tenants/acme/events",
            json!({
                "event": "welcome",
                "recipient": { "address": "ann@example.com", "name": "Ann" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "queued");

    assert!(state.pool.shutdown(std::time::Duration::from_secs(5)).await);
    let (status, page) = call(&app, get("/api/v1/tenants/acme/notifications?status=sent")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn test_auto_send_toggle() {
    let (app, _) = app();

    let (status, body) = call(
        &app,
        json_request(
            "PUT",
            "/api/v1/tenants/acme/auto-send/welcome",
            json!({ "enabled": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);

    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/api/v1/tenants/acme/events",
            json!({
                "event": "welcome",
                "recipient": { "address": "ann@example.com" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "skipped");
}
