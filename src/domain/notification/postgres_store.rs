//! PostgreSQL-based notification storage.
//!
//! ```sql
//! CREATE TABLE notifications (
//!     id                  UUID PRIMARY KEY,
//!     tenant_id           TEXT NOT NULL,
//!     template_id         UUID,
//!     template_key        TEXT,
//!     channel             TEXT NOT NULL,
//!     recipient           TEXT NOT NULL,
//!     subject             TEXT NOT NULL,
//!     body                TEXT NOT NULL,
//!     status              TEXT NOT NULL,
//!     error               TEXT,
//!     provider_message_id TEXT,
//!     attempts            INTEGER NOT NULL,
//!     metadata            JSONB NOT NULL,
//!     sent_at             TIMESTAMPTZ,
//!     delivered_at        TIMESTAMPTZ,
//!     created_at          TIMESTAMPTZ NOT NULL,
//!     updated_at          TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX notifications_tenant_created ON notifications (tenant_id, created_at DESC);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::store::StoreError;

use super::store::{stale, NotificationStore};
use super::types::{Notification, NotificationFilter, NotificationStatus, Page};

const SELECT_COLUMNS: &str = "id, tenant_id, template_id, template_key, channel, recipient, \
     subject, body, status, error, provider_message_id, attempts, metadata, sent_at, \
     delivered_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    tenant_id: String,
    template_id: Option<Uuid>,
    template_key: Option<String>,
    channel: String,
    recipient: String,
    subject: String,
    body: String,
    status: String,
    error: Option<String>,
    provider_message_id: Option<String>,
    attempts: i32,
    metadata: serde_json::Value,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            tenant_id: row.tenant_id,
            template_id: row.template_id,
            template_key: row.template_key,
            channel: row.channel.parse().map_err(StoreError::Corrupt)?,
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            error: row.error,
            provider_message_id: row.provider_message_id,
            attempts: row.attempts.max(0) as u32,
            metadata: row.metadata,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-based notification store
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Append the tenant and filter predicates shared by the list and count queries
fn push_filter<'a>(
    query: &mut QueryBuilder<'a, Postgres>,
    tenant_id: &'a str,
    filter: &'a NotificationFilter,
) {
    query.push(" WHERE tenant_id = ").push_bind(tenant_id);
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(channel) = filter.channel {
        query.push(" AND channel = ").push_bind(channel.as_str());
    }
    if let Some(recipient) = &filter.recipient {
        query.push(" AND recipient = ").push_bind(recipient);
    }
    if let Some(key) = &filter.template_key {
        query.push(" AND template_key = ").push_bind(key);
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, n: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, tenant_id, template_id, template_key, channel, recipient, subject, body,
                 status, error, provider_message_id, attempts, metadata, sent_at, delivered_at,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(n.id)
        .bind(&n.tenant_id)
        .bind(n.template_id)
        .bind(&n.template_key)
        .bind(n.channel.as_str())
        .bind(&n.recipient)
        .bind(&n.subject)
        .bind(&n.body)
        .bind(n.status.as_str())
        .bind(&n.error)
        .bind(&n.provider_message_id)
        .bind(n.attempts as i32)
        .bind(&n.metadata)
        .bind(n.sent_at)
        .bind(n.delivered_at)
        .bind(n.created_at)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, n: &Notification, expected: NotificationStatus) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2, error = $3, provider_message_id = $4, attempts = $5,
                metadata = $6, sent_at = $7, delivered_at = $8, updated_at = $9
            WHERE id = $1 AND status = $10
            "#,
        )
        .bind(n.id)
        .bind(n.status.as_str())
        .bind(&n.error)
        .bind(&n.provider_message_id)
        .bind(n.attempts as i32)
        .bind(&n.metadata)
        .bind(n.sent_at)
        .bind(n.delivered_at)
        .bind(n.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<(String,)> =
                sqlx::query_as("SELECT status FROM notifications WHERE id = $1")
                    .bind(n.id)
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match current {
                Some((status,)) => stale(n.id, status, expected),
                None => StoreError::NotFound(n.id.to_string()),
            });
        }
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE tenant_id = $1 AND id = $2",
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, StoreError> {
        let limit = filter.effective_limit();

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
        push_filter(&mut count_query, tenant_id, filter);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM notifications",
            SELECT_COLUMNS
        ));
        push_filter(&mut query, tenant_id, filter);
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        let rows: Vec<NotificationRow> = query.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: total as usize,
            limit,
            offset: filter.offset,
        })
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
