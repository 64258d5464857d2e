use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::domain::provider::ProviderConfig;
use crate::domain::ratelimit::RateLimitConfig;
use crate::domain::tenant::TenantConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Seconds to wait for detached work to drain on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Required `X-API-Key` value; unset disables the check
    pub key: Option<String>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Total provider attempts per notification, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Deadline for critical sends in milliseconds (0 = none)
    #[serde(default = "default_critical_timeout_ms")]
    pub critical_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// When false every tier runs synchronously on the caller
    #[serde(default = "default_true")]
    pub async_enabled: bool,
    /// Maximum concurrently running detached jobs
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum detached jobs waiting for a worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Product name passed to templates as `appName`
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptionConfig {
    /// Base64 of 32 bytes, or a raw 32-byte string. Unset uses the
    /// development placeholder (refused in production).
    pub key: Option<String>,
}

/// Process-wide providers used when a tenant has none configured
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    pub email: Option<ProviderConfig>,
    pub sms: Option<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn configured(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.email.iter().chain(self.sms.iter())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Days to keep notification records (0 = keep forever)
    #[serde(default = "default_retention_days")]
    pub days: u32,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_database_url() -> String {
    "postgres://localhost:5432/ara".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_critical_timeout_ms() -> u64 {
    15_000
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_app_name() -> String {
    "Ara".to_string()
}

fn default_retention_days() -> u32 {
    90
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "ara-dispatch".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

/// Current `RUN_MODE`, defaulting to development
pub fn run_mode() -> String {
    env::var("RUN_MODE").unwrap_or_else(|_| "development".into())
}

/// Whether `RUN_MODE` names a production profile
pub fn is_production() -> bool {
    matches!(run_mode().as_str(), "production" | "prod")
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = run_mode();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("database.backend", "memory")?
            .set_default("delivery.retry_attempts", 3)?
            .set_default("dispatch.async_enabled", true)?
            .set_default("tenant.default_language", "en")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // ARA__SERVER__PORT, ARA__DELIVERY__RETRY_ATTEMPTS, ARA__ENCRYPTION__KEY, etc.
            .add_source(
                Environment::with_prefix("ARA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            database: DatabaseConfig::default(),
            delivery: DeliveryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            dispatch: DispatchConfig::default(),
            tenant: TenantConfig::default(),
            encryption: EncryptionConfig::default(),
            providers: ProvidersConfig::default(),
            retention: RetentionConfig::default(),
            otel: OtelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            critical_timeout_ms: default_critical_timeout_ms(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            async_enabled: true,
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            app_name: default_app_name(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
