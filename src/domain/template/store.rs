//! Template storage backends.
//!
//! `TemplateStore` abstracts the persistence layer so that the resolver and the
//! CRUD surface work the same against memory and PostgreSQL.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::StorageBackend;
use crate::domain::store::StoreError;
use crate::postgres::PostgresPool;

use super::postgres_store::PostgresTemplateStore;
use super::types::{Template, TemplateIdentity};

/// Backend trait for template storage.
///
/// Implementations must enforce the uniqueness of [`TemplateIdentity`] and be
/// safe for concurrent writes to distinct records.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend_type(&self) -> &'static str;

    /// Look up by natural key
    async fn find(&self, identity: &TemplateIdentity) -> Result<Option<Template>, StoreError>;

    /// Look up by surrogate id within a tenant
    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Template>, StoreError>;

    /// All templates of a tenant, ordered by key then language
    async fn list(&self, tenant_id: &str) -> Result<Vec<Template>, StoreError>;

    /// Insert a new template; `Conflict` if the identity is taken
    async fn insert(&self, template: Template) -> Result<Template, StoreError>;

    /// Insert unless the identity is taken. Returns whether a row was written.
    async fn insert_if_absent(&self, template: Template) -> Result<bool, StoreError>;

    /// Replace an existing template (matched by id)
    async fn update(&self, template: Template) -> Result<Template, StoreError>;

    /// Number of templates held for a tenant
    async fn count(&self, tenant_id: &str) -> Result<usize, StoreError>;
}

/// In-memory template storage
pub struct MemoryTemplateStore {
    templates: DashMap<Uuid, Template>,
    index: DashMap<TemplateIdentity, Uuid>,
}

impl Default for MemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
            index: DashMap::new(),
        }
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, identity: &TemplateIdentity) -> Result<Option<Template>, StoreError> {
        let Some(id) = self.index.get(identity).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.templates.get(&id).map(|t| t.clone()))
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Template>, StoreError> {
        Ok(self
            .templates
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id)
            .map(|t| t.clone()))
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<Template>, StoreError> {
        let mut templates: Vec<Template> = self
            .templates
            .iter()
            .filter(|entry| entry.value().tenant_id == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        templates.sort_by(|a, b| {
            (a.key.as_str(), a.channel.as_str(), a.language.as_str()).cmp(&(
                b.key.as_str(),
                b.channel.as_str(),
                b.language.as_str(),
            ))
        });
        Ok(templates)
    }

    async fn insert(&self, template: Template) -> Result<Template, StoreError> {
        match self.index.entry(template.identity()) {
            Entry::Occupied(entry) => Err(StoreError::Conflict(entry.key().to_string())),
            Entry::Vacant(entry) => {
                self.templates.insert(template.id, template.clone());
                entry.insert(template.id);
                Ok(template)
            }
        }
    }

    async fn insert_if_absent(&self, template: Template) -> Result<bool, StoreError> {
        match self.insert(template).await {
            Ok(_) => Ok(true),
            Err(StoreError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, template: Template) -> Result<Template, StoreError> {
        let mut existing = self
            .templates
            .get_mut(&template.id)
            .filter(|t| t.tenant_id == template.tenant_id)
            .ok_or_else(|| StoreError::NotFound(template.id.to_string()))?;

        if existing.identity() != template.identity() {
            return Err(StoreError::Conflict(
                "template identity cannot change on update".to_string(),
            ));
        }

        *existing = template.clone();
        Ok(template)
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .templates
            .iter()
            .filter(|entry| entry.value().tenant_id == tenant_id)
            .count())
    }
}

/// Create the template store selected by configuration
pub fn create_template_store(
    backend: StorageBackend,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn TemplateStore> {
    match backend {
        StorageBackend::Postgres => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL template store");
                Arc::new(PostgresTemplateStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL template store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryTemplateStore::new())
            }
        }
        StorageBackend::Memory => {
            tracing::info!(backend = "memory", "Creating memory template store");
            Arc::new(MemoryTemplateStore::new())
        }
    }
}
