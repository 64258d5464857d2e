mod settings;

pub use settings::{
    is_production, run_mode, ApiConfig, DatabaseConfig, DeliveryConfig, DispatchConfig,
    EncryptionConfig, LoggingConfig, OtelConfig, ProvidersConfig, RetentionConfig, ServerConfig,
    Settings, StorageBackend,
};
