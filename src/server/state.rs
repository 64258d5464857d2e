use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::dispatch::{NotificationAdapter, PriorityDispatcher, WorkerPool};
use crate::domain::audit::{AuditSink, TracingAuditSink};
use crate::domain::notification::{create_notification_store, DeliveryService};
use crate::domain::provider::ProviderRegistry;
use crate::domain::ratelimit::RateLimiter;
use crate::domain::template::{create_template_store, DefaultCatalog, TemplateResolver};
use crate::domain::tenant::SettingsStore;
use crate::domain::vault::CredentialVault;
use crate::error::Result;
use crate::postgres::PostgresPool;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub start_time: Instant,
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub resolver: Arc<TemplateResolver>,
    pub delivery: Arc<DeliveryService>,
    pub tenant_settings: Arc<SettingsStore>,
    pub vault: Arc<CredentialVault>,
    pub rate_limiter: Arc<RateLimiter>,
    pub pool: Arc<WorkerPool>,
    pub dispatcher: Arc<PriorityDispatcher>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Wire the service graph. Must be called from within a tokio runtime.
    pub fn new(
        settings: Settings,
        vault: CredentialVault,
        postgres_pool: Option<Arc<PostgresPool>>,
    ) -> Result<Self> {
        let backend = settings.database.backend;
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

        let resolver = Arc::new(TemplateResolver::new(
            create_template_store(backend, postgres_pool.clone()),
            Arc::new(DefaultCatalog::builtin()),
            settings.tenant.clone(),
            Arc::clone(&audit),
        ));

        let registry = ProviderRegistry::from_configs(settings.providers.configured())?;
        for (channel, provider) in registry.describe() {
            tracing::info!(channel = %channel, provider = %provider, "Default provider registered");
        }

        let vault = Arc::new(vault);
        let tenant_settings = Arc::new(SettingsStore::new());
        let rate_limiter = Arc::new(RateLimiter::new(settings.rate_limit.clone()));

        let delivery = Arc::new(
            DeliveryService::new(
                create_notification_store(backend, postgres_pool.clone()),
                Arc::clone(&resolver),
                registry,
                settings.delivery.clone(),
            )
            .with_tenant_settings(Arc::clone(&tenant_settings), Arc::clone(&vault))
            .with_rate_limiter(Arc::clone(&rate_limiter)),
        );

        let adapter = Arc::new(NotificationAdapter::new(
            Arc::clone(&delivery),
            Arc::clone(&tenant_settings),
            settings.dispatch.app_name.clone(),
        ));
        let pool = Arc::new(WorkerPool::from_config(&settings.dispatch));
        let dispatcher = Arc::new(PriorityDispatcher::new(
            adapter,
            Arc::clone(&pool),
            &settings.dispatch,
            &settings.delivery,
        ));

        Ok(Self {
            settings: Arc::new(settings),
            start_time: Instant::now(),
            postgres_pool,
            resolver,
            delivery,
            tenant_settings,
            vault,
            rate_limiter,
            pool,
            dispatcher,
            audit,
        })
    }
}
