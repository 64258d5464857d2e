//! Template resolution, lazy seeding and the tenant CRUD surface.
//!
//! Resolution walks an ordered chain of [`LookupStep`]s; the first active
//! template found wins:
//!
//! 1. exact `(tenant, key, channel, language)`
//! 2. the tenant's default language, if different
//! 3. make sure the default catalog is seeded, then retry 1-2
//!
//! Authored templates and seeded defaults share the same identity space. With
//! override mode on, authoring a template over a seeded default rewrites that
//! row as the authored template, keeping its id; with it off the default is
//! kept and edited in place (`is_modified = true`). Template rows are never
//! deleted.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::domain::audit::{AuditEntry, AuditSink};
use crate::domain::notification::ChannelType;
use crate::domain::store::StoreError;
use crate::domain::tenant::{TenantConfig, TenantPolicy};
use crate::metrics::TemplateMetrics;

use super::defaults::DefaultCatalog;
use super::render::render_template;
use super::store::TemplateStore;
use super::types::{
    CreateTemplateRequest, RenderedMessage, Template, TemplateError, TemplateIdentity,
    TemplateResult, UpdateTemplateRequest,
};

/// Actor recorded for changes made by the service itself
const SYSTEM_ACTOR: &str = "system";

/// One step of the resolution chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStep {
    /// Exact identity match in `language`
    Exact { language: String },
    /// Wait until the default catalog is seeded, then retry the exact steps
    Seed,
}

/// Resolves templates for tenants and manages their lifecycle
pub struct TemplateResolver {
    store: Arc<dyn TemplateStore>,
    catalog: Arc<DefaultCatalog>,
    tenants: TenantConfig,
    audit: Arc<dyn AuditSink>,
    /// Tenants whose seeding has completed in this process
    seeded: DashMap<String, Arc<OnceCell<usize>>>,
}

impl TemplateResolver {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        catalog: Arc<DefaultCatalog>,
        tenants: TenantConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            tenants,
            audit,
            seeded: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TemplateStore> {
        &self.store
    }

    pub fn catalog(&self) -> &DefaultCatalog {
        &self.catalog
    }

    pub fn policy(&self, tenant_id: &str) -> TenantPolicy {
        self.tenants.policy_for(tenant_id)
    }

    /// Ordered lookup chain for a request
    pub fn lookup_chain(&self, policy: &TenantPolicy, language: &str) -> Vec<LookupStep> {
        let mut chain = vec![LookupStep::Exact {
            language: language.to_string(),
        }];
        if language != policy.default_language {
            chain.push(LookupStep::Exact {
                language: policy.default_language.clone(),
            });
        }
        if policy.seed_defaults {
            chain.push(LookupStep::Seed);
        }
        chain
    }

    /// Resolve the active template for `(tenant, key, channel, language)`.
    ///
    /// `language` defaults to the tenant's default language.
    #[tracing::instrument(name = "template.resolve", skip(self), fields(outcome))]
    pub async fn resolve(
        &self,
        tenant_id: &str,
        key: &str,
        channel: ChannelType,
        language: Option<&str>,
    ) -> TemplateResult<Template> {
        let policy = self.policy(tenant_id);
        let language = language
            .filter(|l| !l.is_empty())
            .unwrap_or(&policy.default_language);
        let identity = TemplateIdentity::new(tenant_id, key, channel, language);

        let chain = self.lookup_chain(&policy, language);
        let mut tried: Vec<&str> = Vec::new();

        for step in &chain {
            match step {
                LookupStep::Exact { language } => {
                    tried.push(language);
                    if let Some(found) = self.find_active(&identity, language).await? {
                        return Ok(self.resolved(found, &identity));
                    }
                }
                LookupStep::Seed => {
                    // Another task may have finished seeding after our exact
                    // lookups, so retry even when this call did not seed
                    self.ensure_seeded(tenant_id, &policy).await?;
                    for language in &tried {
                        if let Some(found) = self.find_active(&identity, language).await? {
                            return Ok(self.resolved(found, &identity));
                        }
                    }
                }
            }
        }

        TemplateMetrics::record_resolution("not_found");
        tracing::Span::current().record("outcome", "not_found");
        Err(TemplateError::NotFound(identity.to_string()))
    }

    fn resolved(&self, template: Template, requested: &TemplateIdentity) -> Template {
        let outcome = if template.language == requested.language {
            "exact"
        } else {
            "fallback"
        };
        TemplateMetrics::record_resolution(outcome);
        tracing::Span::current().record("outcome", outcome);
        template
    }

    async fn find_active(
        &self,
        identity: &TemplateIdentity,
        language: &str,
    ) -> TemplateResult<Option<Template>> {
        Ok(self
            .store
            .find(&identity.with_language(language))
            .await?
            .filter(|t| t.active))
    }

    /// Seed the tenant's default set unless this process already did.
    ///
    /// On return the seeding run has completed, whichever caller performed
    /// it. Concurrent callers for the same tenant wait for one run; a failed
    /// run is retried by the next caller.
    async fn ensure_seeded(&self, tenant_id: &str, policy: &TenantPolicy) -> TemplateResult<()> {
        let cell = Arc::clone(
            self.seeded
                .entry(tenant_id.to_string())
                .or_default()
                .value(),
        );

        cell.get_or_try_init(|| self.seed(tenant_id, &policy.default_language))
            .await?;
        Ok(())
    }

    /// Insert every catalog template that the tenant does not have yet
    async fn seed(&self, tenant_id: &str, language: &str) -> TemplateResult<usize> {
        let mut inserted = 0;
        for template in self.catalog.instantiate_all(tenant_id, language) {
            if self.store.insert_if_absent(template).await? {
                inserted += 1;
            }
        }

        TemplateMetrics::record_seeded(inserted as u64);
        tracing::info!(
            tenant_id = %tenant_id,
            language = %language,
            inserted = inserted,
            "Seeded default templates"
        );
        if inserted > 0 {
            self.audit.record(
                AuditEntry::new(tenant_id, SYSTEM_ACTOR, "template.seeded", tenant_id)
                    .with_metadata(serde_json::json!({
                        "language": language,
                        "inserted": inserted,
                    })),
            );
        }
        Ok(inserted)
    }

    /// Resolve and render in one step
    pub async fn render(
        &self,
        tenant_id: &str,
        key: &str,
        channel: ChannelType,
        language: Option<&str>,
        variables: &Value,
    ) -> TemplateResult<(Template, RenderedMessage)> {
        let template = self.resolve(tenant_id, key, channel, language).await?;
        let rendered = render_template(&template, variables).inspect_err(|e| {
            TemplateMetrics::record_render_error();
            tracing::warn!(
                tenant_id = %tenant_id,
                template_key = %key,
                error = %e,
                "Template render failed"
            );
        })?;
        Ok((template, rendered))
    }

    // ========================================================================
    // Tenant CRUD
    // ========================================================================

    /// All templates of a tenant, seeding the defaults first when enabled
    pub async fn list(&self, tenant_id: &str) -> TemplateResult<Vec<Template>> {
        let policy = self.policy(tenant_id);
        if policy.seed_defaults {
            self.ensure_seeded(tenant_id, &policy).await?;
        }
        Ok(self.store.list(tenant_id).await?)
    }

    pub async fn get(&self, tenant_id: &str, id: Uuid) -> TemplateResult<Template> {
        self.store
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// Author a template
    pub async fn create(
        &self,
        tenant_id: &str,
        actor: &str,
        request: CreateTemplateRequest,
    ) -> TemplateResult<Template> {
        let policy = self.policy(tenant_id);
        let template = request.into_template(tenant_id, &policy.default_language);
        template.validate()?;
        let identity = template.identity();

        if let Some(existing) = self.store.find(&identity).await? {
            if !(existing.is_default && policy.allow_overrides) {
                return Err(TemplateError::AlreadyExists(identity.to_string()));
            }
            return self.override_default(actor, existing, template).await;
        }

        let created = self.store.insert(template).await.map_err(|e| match e {
            StoreError::Conflict(msg) => TemplateError::AlreadyExists(msg),
            other => other.into(),
        })?;

        self.audit_change(actor, "template.created", &created);
        Ok(created)
    }

    /// Rewrite a seeded default as an authored template.
    ///
    /// The row keeps its id and creation time so notifications that
    /// reference it still resolve.
    async fn override_default(
        &self,
        actor: &str,
        existing: Template,
        authored: Template,
    ) -> TemplateResult<Template> {
        let template = Template {
            id: existing.id,
            created_at: existing.created_at,
            ..authored
        };

        let updated = self.store.update(template).await?;
        tracing::debug!(
            identity = %updated.identity(),
            template_id = %updated.id,
            "Authored template overrides seeded default"
        );
        self.audit_change(actor, "template.overridden", &updated);
        Ok(updated)
    }

    /// Edit a template; content edits on a seeded default mark it modified
    pub async fn update(
        &self,
        tenant_id: &str,
        actor: &str,
        id: Uuid,
        request: UpdateTemplateRequest,
    ) -> TemplateResult<Template> {
        let mut template = self.get(tenant_id, id).await?;

        if template.is_default && request.changes_content() {
            template.is_modified = true;
        }
        if let Some(name) = request.name {
            template.name = name;
        }
        if let Some(subject) = request.subject {
            template.subject = subject;
        }
        if let Some(body) = request.body {
            template.body = body;
        }
        if let Some(variables) = request.variables {
            template.variables = variables;
        }
        if let Some(metadata) = request.metadata {
            template.metadata = metadata;
        }
        if let Some(active) = request.active {
            template.active = active;
        }
        template.updated_at = Utc::now();
        template.validate()?;

        let updated = self.store.update(template).await?;
        self.audit_change(actor, "template.updated", &updated);
        Ok(updated)
    }

    /// Soft-delete: the row stays so existing notifications keep their reference
    pub async fn deactivate(&self, tenant_id: &str, actor: &str, id: Uuid) -> TemplateResult<Template> {
        let mut template = self.get(tenant_id, id).await?;
        template.active = false;
        template.updated_at = Utc::now();

        let updated = self.store.update(template).await?;
        self.audit_change(actor, "template.deactivated", &updated);
        Ok(updated)
    }

    /// Restore catalog content for a template whose key has a default
    pub async fn reset_to_default(
        &self,
        tenant_id: &str,
        actor: &str,
        id: Uuid,
    ) -> TemplateResult<Template> {
        let mut template = self.get(tenant_id, id).await?;
        let default = self
            .catalog
            .find(&template.key, template.channel)
            .ok_or_else(|| {
                TemplateError::NotFound(format!("no default for {}", template.identity()))
            })?;

        let fresh = default.instantiate(tenant_id, &template.language);
        template.name = fresh.name;
        template.subject = fresh.subject;
        template.body = fresh.body;
        template.variables = fresh.variables;
        template.active = true;
        template.is_default = true;
        template.is_modified = false;
        template.updated_at = Utc::now();

        let updated = self.store.update(template).await?;
        self.audit_change(actor, "template.reset", &updated);
        Ok(updated)
    }

    /// Render a stored template with sample variables
    pub async fn preview(
        &self,
        tenant_id: &str,
        id: Uuid,
        variables: &Value,
    ) -> TemplateResult<RenderedMessage> {
        let template = self.get(tenant_id, id).await?;
        Ok(render_template(&template, variables)?)
    }

    fn audit_change(&self, actor: &str, action: &str, template: &Template) {
        self.audit.record(
            AuditEntry::new(&template.tenant_id, actor, action, template.id.to_string())
                .with_metadata(serde_json::json!({
                    "key": template.key,
                    "channel": template.channel,
                    "language": template.language,
                })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::MemoryAuditSink;
    use crate::domain::template::store::MemoryTemplateStore;
    use serde_json::json;

    fn resolver_with(config: TenantConfig) -> (TemplateResolver, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let resolver = TemplateResolver::new(
            Arc::new(MemoryTemplateStore::new()),
            Arc::new(DefaultCatalog::builtin()),
            config,
            audit.clone(),
        );
        (resolver, audit)
    }

    fn resolver() -> (TemplateResolver, Arc<MemoryAuditSink>) {
        resolver_with(TenantConfig::default())
    }

    fn authored(key: &str, language: Option<&str>, body: &str) -> CreateTemplateRequest {
        CreateTemplateRequest {
            key: key.to_string(),
            channel: ChannelType::Email,
            language: language.map(str::to_string),
            name: "Custom".to_string(),
            subject: "Custom subject".to_string(),
            body: body.to_string(),
            variables: vec![],
            metadata: Value::Null,
        }
    }

    #[test]
    fn test_lookup_chain_order() {
        let (resolver, _) = resolver();
        let policy = resolver.policy("acme");

        assert_eq!(
            resolver.lookup_chain(&policy, "es"),
            vec![
                LookupStep::Exact { language: "es".into() },
                LookupStep::Exact { language: "en".into() },
                LookupStep::Seed,
            ]
        );
        assert_eq!(resolver.lookup_chain(&policy, "en").len(), 2);
    }

    #[tokio::test]
    async fn test_language_fallback() {
        let (resolver, _) = resolver();
        resolver
            .create("acme", "admin", authored("custom.notice", Some("en"), "English"))
            .await
            .unwrap();

        let t = resolver
            .resolve("acme", "custom.notice", ChannelType::Email, Some("es"))
            .await
            .unwrap();
        assert_eq!(t.language, "en");
        assert_eq!(t.body, "English");
    }

    #[tokio::test]
    async fn test_exact_language_preferred() {
        let (resolver, _) = resolver();
        resolver
            .create("acme", "admin", authored("custom.notice", Some("en"), "English"))
            .await
            .unwrap();
        resolver
            .create("acme", "admin", authored("custom.notice", Some("es"), "Spanish"))
            .await
            .unwrap();

        let t = resolver
            .resolve("acme", "custom.notice", ChannelType::Email, Some("es"))
            .await
            .unwrap();
        assert_eq!(t.body, "Spanish");
    }

    #[tokio::test]
    async fn test_lazy_seeding_runs_once() {
        let (resolver, audit) = resolver();

        let first = resolver
            .resolve("acme", "auth.welcome", ChannelType::Email, None)
            .await
            .unwrap();
        assert!(first.is_default);

        let count = resolver.store().count("acme").await.unwrap();
        assert_eq!(count, resolver.catalog().len());

        resolver
            .resolve("acme", "auth.mfa_code", ChannelType::Sms, Some("fr"))
            .await
            .unwrap();
        assert_eq!(resolver.store().count("acme").await.unwrap(), count);
        assert_eq!(audit.actions(), vec!["template.seeded"]);
    }

    /// Memory store that yields while seeding so resolves interleave
    struct SlowSeedStore(MemoryTemplateStore);

    #[async_trait::async_trait]
    impl TemplateStore for SlowSeedStore {
        fn backend_type(&self) -> &'static str {
            "slow-memory"
        }

        async fn find(&self, identity: &TemplateIdentity) -> Result<Option<Template>, StoreError> {
            self.0.find(identity).await
        }

        async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Template>, StoreError> {
            self.0.get(tenant_id, id).await
        }

        async fn list(&self, tenant_id: &str) -> Result<Vec<Template>, StoreError> {
            self.0.list(tenant_id).await
        }

        async fn insert(&self, template: Template) -> Result<Template, StoreError> {
            self.0.insert(template).await
        }

        async fn insert_if_absent(&self, template: Template) -> Result<bool, StoreError> {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            self.0.insert_if_absent(template).await
        }

        async fn update(&self, template: Template) -> Result<Template, StoreError> {
            self.0.update(template).await
        }

        async fn count(&self, tenant_id: &str) -> Result<usize, StoreError> {
            self.0.count(tenant_id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_resolves_all_succeed() {
        let audit = Arc::new(MemoryAuditSink::new());
        let resolver = Arc::new(TemplateResolver::new(
            Arc::new(SlowSeedStore(MemoryTemplateStore::new())),
            Arc::new(DefaultCatalog::builtin()),
            TenantConfig::default(),
            audit.clone(),
        ));

        let (a, b) = tokio::join!(
            resolver.resolve("acme", "auth.welcome", ChannelType::Email, None),
            resolver.resolve("acme", "auth.welcome", ChannelType::Email, None),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = Arc::clone(&resolver);
                let tenant = format!("tenant-{}", i % 2);
                tokio::spawn(async move {
                    resolver
                        .resolve(&tenant, "auth.password_reset", ChannelType::Email, Some("de"))
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().language, "en");
        }

        for tenant in ["acme", "tenant-0", "tenant-1"] {
            assert_eq!(
                resolver.store().count(tenant).await.unwrap(),
                resolver.catalog().len()
            );
        }
        assert_eq!(
            audit
                .actions()
                .iter()
                .filter(|a| a.as_str() == "template.seeded")
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn test_not_found_without_seeding() {
        let mut config = TenantConfig::default();
        config.seed_defaults = false;
        let (resolver, _) = resolver_with(config);

        let err = resolver
            .resolve("acme", "auth.welcome", ChannelType::Email, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
        assert_eq!(resolver.store().count("acme").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_key_not_found_after_seeding() {
        let (resolver, _) = resolver();
        assert!(matches!(
            resolver
                .resolve("acme", "no.such.key", ChannelType::Email, None)
                .await,
            Err(TemplateError::NotFound(_))
        ));
        // A second miss does not seed again
        assert!(resolver
            .resolve("acme", "no.such.key", ChannelType::Email, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_inactive_templates_do_not_match() {
        let (resolver, _) = resolver();
        let t = resolver
            .create("acme", "admin", authored("custom.notice", Some("en"), "Body"))
            .await
            .unwrap();
        resolver.deactivate("acme", "admin", t.id).await.unwrap();

        assert!(resolver
            .resolve("acme", "custom.notice", ChannelType::Email, None)
            .await
            .is_err());
        // Soft-deleted row is still there
        assert!(!resolver.get("acme", t.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_override_replaces_seeded_default() {
        let (resolver, audit) = resolver();
        let default = resolver
            .resolve("acme", "auth.welcome", ChannelType::Email, None)
            .await
            .unwrap();
        let count = resolver.store().count("acme").await.unwrap();

        let created = resolver
            .create("acme", "admin", authored("auth.welcome", None, "Custom welcome"))
            .await
            .unwrap();
        assert_eq!(created.id, default.id);
        assert_eq!(created.created_at, default.created_at);

        let t = resolver
            .resolve("acme", "auth.welcome", ChannelType::Email, None)
            .await
            .unwrap();
        assert_eq!(t.body, "Custom welcome");
        assert!(!t.is_default);

        // The row a notification may reference is still there
        assert_eq!(resolver.get("acme", default.id).await.unwrap().body, "Custom welcome");
        assert_eq!(resolver.store().count("acme").await.unwrap(), count);
        assert!(audit.actions().contains(&"template.overridden".to_string()));

        // Authoring the same identity again is a conflict
        assert!(matches!(
            resolver
                .create("acme", "admin", authored("auth.welcome", None, "Again"))
                .await,
            Err(TemplateError::AlreadyExists(_))
        ));

        let reset = resolver
            .reset_to_default("acme", "admin", default.id)
            .await
            .unwrap();
        assert!(reset.is_default);
        assert_eq!(reset.body, default.body);
    }

    #[tokio::test]
    async fn test_without_overrides_default_is_edited_in_place() {
        let mut config = TenantConfig::default();
        config.allow_overrides = false;
        let (resolver, _) = resolver_with(config);

        let default = resolver
            .resolve("acme", "auth.welcome", ChannelType::Email, None)
            .await
            .unwrap();

        assert!(matches!(
            resolver
                .create("acme", "admin", authored("auth.welcome", None, "Custom"))
                .await,
            Err(TemplateError::AlreadyExists(_))
        ));

        let edited = resolver
            .update(
                "acme",
                "admin",
                default.id,
                UpdateTemplateRequest {
                    body: Some("Hello {{ userName }}!".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(edited.is_default);
        assert!(edited.is_modified);

        let reset = resolver
            .reset_to_default("acme", "admin", default.id)
            .await
            .unwrap();
        assert!(!reset.is_modified);
        assert_eq!(reset.body, default.body);
    }

    #[tokio::test]
    async fn test_preview_and_render_errors() {
        let (resolver, _) = resolver();
        let t = resolver
            .create("acme", "admin", authored("custom.notice", None, "Hi {{ name }}"))
            .await
            .unwrap();

        let out = resolver
            .preview("acme", t.id, &json!({"name": "Ann"}))
            .await
            .unwrap();
        assert_eq!(out.body, "Hi Ann");

        assert!(matches!(
            resolver.preview("acme", t.id, &json!({})).await,
            Err(TemplateError::Render(_))
        ));
        assert!(matches!(
            resolver.preview("globex", t.id, &json!({})).await,
            Err(TemplateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_template_rejected() {
        let (resolver, _) = resolver();
        let mut request = authored("custom.notice", None, "Body");
        request.subject.clear();
        assert!(matches!(
            resolver.create("acme", "admin", request).await,
            Err(TemplateError::InvalidTemplate(_))
        ));
    }
}
