//! Notification templates.
//!
//! - `types`: template records and request types
//! - `render`: pattern rendering (`tera` syntax)
//! - `store`: storage trait and in-memory backend
//! - `postgres_store`: PostgreSQL backend
//! - `defaults`: built-in catalog used for lazy seeding
//! - `resolver`: tenant/language resolution and the CRUD surface
//!
//! # Example
//!
//! ```ignore
//! let resolver = TemplateResolver::new(store, catalog, tenant_config, audit);
//!
//! // Seeds the tenant's defaults on first use, then falls back to "en"
//! let (template, rendered) = resolver
//!     .render("acme", "auth.welcome", ChannelType::Email, Some("es"), &json!({
//!         "userName": "Ann",
//!         "appName": "Acme"
//!     }))
//!     .await?;
//! ```

mod defaults;
mod postgres_store;
pub mod render;
mod resolver;
mod store;
mod types;

pub use defaults::{DefaultCatalog, DefaultTemplate};
pub use postgres_store::PostgresTemplateStore;
pub use render::{render, render_template, RenderError};
pub use resolver::{LookupStep, TemplateResolver};
pub use store::{create_template_store, MemoryTemplateStore, TemplateStore};
pub use types::{
    validate_key, CreateTemplateRequest, PreviewRequest, RenderedMessage, Template,
    TemplateError, TemplateIdentity, TemplateListResponse, TemplateResult,
    UpdateTemplateRequest,
};
