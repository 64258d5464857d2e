//! PostgreSQL-based template storage.
//!
//! Table structure (schema is managed outside this service):
//!
//! ```sql
//! CREATE TABLE notification_templates (
//!     id          UUID PRIMARY KEY,
//!     tenant_id   TEXT NOT NULL,
//!     key         TEXT NOT NULL,
//!     channel     TEXT NOT NULL,
//!     language    TEXT NOT NULL,
//!     name        TEXT NOT NULL,
//!     subject     TEXT NOT NULL,
//!     body        TEXT NOT NULL,
//!     variables   JSONB NOT NULL,
//!     metadata    JSONB NOT NULL,
//!     active      BOOLEAN NOT NULL,
//!     is_default  BOOLEAN NOT NULL,
//!     is_modified BOOLEAN NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     updated_at  TIMESTAMPTZ NOT NULL,
//!     UNIQUE (tenant_id, key, channel, language)
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::store::StoreError;

use super::store::TemplateStore;
use super::types::{Template, TemplateIdentity};

const SELECT_COLUMNS: &str = "id, tenant_id, key, channel, language, name, subject, body, \
     variables, metadata, active, is_default, is_modified, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    tenant_id: String,
    key: String,
    channel: String,
    language: String,
    name: String,
    subject: String,
    body: String,
    variables: serde_json::Value,
    metadata: serde_json::Value,
    active: bool,
    is_default: bool,
    is_modified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = StoreError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(Template {
            id: row.id,
            tenant_id: row.tenant_id,
            key: row.key,
            channel: row.channel.parse().map_err(StoreError::Corrupt)?,
            language: row.language,
            name: row.name,
            subject: row.subject,
            body: row.body,
            variables: serde_json::from_value(row.variables)?,
            metadata: row.metadata,
            active: row.active,
            is_default: row.is_default,
            is_modified: row.is_modified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-based template store.
pub struct PostgresTemplateStore {
    pool: PgPool,
}

impl PostgresTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert, returning `None` when the natural key is already taken
    async fn insert_row(&self, template: &Template) -> Result<Option<Uuid>, StoreError> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO notification_templates
                (id, tenant_id, key, channel, language, name, subject, body,
                 variables, metadata, active, is_default, is_modified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (tenant_id, key, channel, language) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(template.id)
        .bind(&template.tenant_id)
        .bind(&template.key)
        .bind(template.channel.as_str())
        .bind(&template.language)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(serde_json::to_value(&template.variables)?)
        .bind(&template.metadata)
        .bind(template.active)
        .bind(template.is_default)
        .bind(template.is_modified)
        .bind(template.created_at)
        .bind(template.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.map(|(id,)| id))
    }
}

#[async_trait]
impl TemplateStore for PostgresTemplateStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn find(&self, identity: &TemplateIdentity) -> Result<Option<Template>, StoreError> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notification_templates \
             WHERE tenant_id = $1 AND key = $2 AND channel = $3 AND language = $4",
            SELECT_COLUMNS
        ))
        .bind(&identity.tenant_id)
        .bind(&identity.key)
        .bind(identity.channel.as_str())
        .bind(&identity.language)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Template::try_from).transpose()
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Template>, StoreError> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notification_templates WHERE tenant_id = $1 AND id = $2",
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Template::try_from).transpose()
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<Template>, StoreError> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notification_templates WHERE tenant_id = $1 \
             ORDER BY key, channel, language",
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Template::try_from).collect()
    }

    async fn insert(&self, template: Template) -> Result<Template, StoreError> {
        match self.insert_row(&template).await? {
            Some(_) => Ok(template),
            None => Err(StoreError::Conflict(template.identity().to_string())),
        }
    }

    async fn insert_if_absent(&self, template: Template) -> Result<bool, StoreError> {
        Ok(self.insert_row(&template).await?.is_some())
    }

    async fn update(&self, template: Template) -> Result<Template, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_templates
            SET name = $3, subject = $4, body = $5, variables = $6, metadata = $7,
                active = $8, is_default = $9, is_modified = $10, updated_at = $11
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(&template.tenant_id)
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(serde_json::to_value(&template.variables)?)
        .bind(&template.metadata)
        .bind(template.active)
        .bind(template.is_default)
        .bind(template.is_modified)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(template.id.to_string()));
        }
        Ok(template)
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notification_templates WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}
