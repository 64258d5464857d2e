//! Notification record storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::StorageBackend;
use crate::domain::store::StoreError;
use crate::postgres::PostgresPool;

use super::postgres_store::PostgresNotificationStore;
use super::types::{Notification, NotificationFilter, NotificationStatus, Page};

/// Backend trait for notification records.
///
/// Writes to distinct records may run concurrently. Writes to one record are
/// conditional on the status the writer read, so racing status changes cannot
/// overwrite each other.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    fn backend_type(&self) -> &'static str;

    async fn insert(&self, notification: &Notification) -> Result<(), StoreError>;

    /// Persist the current state of a record whose stored status is still
    /// `expected`; `Stale` otherwise
    async fn update(
        &self,
        notification: &Notification,
        expected: NotificationStatus,
    ) -> Result<(), StoreError>;

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Newest first
    async fn list(
        &self,
        tenant_id: &str,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, StoreError>;

    /// Delete records created before `cutoff`; returns the number removed
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory notification storage
#[derive(Default)]
pub struct MemoryNotificationStore {
    records: DashMap<Uuid, Notification>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        match self.records.entry(notification.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(notification.id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(notification.clone());
                Ok(())
            }
        }
    }

    async fn update(
        &self,
        notification: &Notification,
        expected: NotificationStatus,
    ) -> Result<(), StoreError> {
        let mut existing = self
            .records
            .get_mut(&notification.id)
            .ok_or_else(|| StoreError::NotFound(notification.id.to_string()))?;
        if existing.status != expected {
            return Err(stale(notification.id, existing.status, expected));
        }
        *existing = notification.clone();
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self
            .records
            .get(&id)
            .filter(|n| n.tenant_id == tenant_id)
            .map(|n| n.clone()))
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &NotificationFilter,
    ) -> Result<Page<Notification>, StoreError> {
        let mut matching: Vec<Notification> = self
            .records
            .iter()
            .filter(|entry| entry.tenant_id == tenant_id && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = filter.effective_limit();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect();

        Ok(Page {
            items,
            total,
            limit,
            offset: filter.offset,
        })
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, n| n.created_at >= cutoff);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}

pub(super) fn stale(id: Uuid, actual: impl std::fmt::Display, expected: NotificationStatus) -> StoreError {
    StoreError::Stale(format!("notification {} is {}, expected {}", id, actual, expected))
}

/// Create the notification store selected by configuration
pub fn create_notification_store(
    backend: StorageBackend,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn NotificationStore> {
    match backend {
        StorageBackend::Postgres => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL notification store");
                Arc::new(PostgresNotificationStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL notification store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryNotificationStore::new())
            }
        }
        StorageBackend::Memory => {
            tracing::info!(backend = "memory", "Creating memory notification store");
            Arc::new(MemoryNotificationStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::ChannelType;
    use chrono::Duration;

    fn record(tenant: &str, recipient: &str) -> Notification {
        Notification::new(tenant, ChannelType::Email, recipient, "Hi", "Body")
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let store = MemoryNotificationStore::new();
        let mut n = record("acme", "ann@example.com");
        store.insert(&n).await.unwrap();
        assert!(matches!(store.insert(&n).await, Err(StoreError::Conflict(_))));

        n.transition(NotificationStatus::Sending).unwrap();
        store.update(&n, NotificationStatus::Pending).await.unwrap();

        let loaded = store.get("acme", n.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, NotificationStatus::Sending);
        assert!(store.get("globex", n.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = MemoryNotificationStore::new();
        assert!(matches!(
            store
                .update(&record("acme", "a@b.c"), NotificationStatus::Pending)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_is_conditional_on_status() {
        let store = MemoryNotificationStore::new();
        let mut n = record("acme", "ann@example.com");
        store.insert(&n).await.unwrap();
        n.transition(NotificationStatus::Sending).unwrap();
        n.transition(NotificationStatus::Sent).unwrap();
        store.update(&n, NotificationStatus::Pending).await.unwrap();

        // Two writers read Sent; only the first one lands
        let mut delivered = n.clone();
        delivered.transition(NotificationStatus::Delivered).unwrap();
        let mut bounced = n.clone();
        bounced.transition(NotificationStatus::Bounced).unwrap();

        store
            .update(&delivered, NotificationStatus::Sent)
            .await
            .unwrap();
        assert!(matches!(
            store.update(&bounced, NotificationStatus::Sent).await,
            Err(StoreError::Stale(_))
        ));

        let stored = store.get("acme", n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Delivered);
    }

    #[tokio::test]
    async fn test_list_filter_and_pagination() {
        let store = MemoryNotificationStore::new();
        for i in 0..5 {
            let mut n = record("acme", if i % 2 == 0 { "ann@example.com" } else { "bob@example.com" });
            n.created_at = Utc::now() - Duration::seconds(10 - i);
            store.insert(&n).await.unwrap();
        }
        store.insert(&record("globex", "ann@example.com")).await.unwrap();

        let page = store
            .list(
                "acme",
                &NotificationFilter {
                    recipient: Some("ann@example.com".to_string()),
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        // Newest first
        assert!(page.items[0].created_at >= page.items[1].created_at);

        let rest = store
            .list(
                "acme",
                &NotificationFilter {
                    offset: 4,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rest.total, 5);
        assert_eq!(rest.items.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let store = MemoryNotificationStore::new();
        let mut old = record("acme", "a@b.c");
        old.created_at = Utc::now() - Duration::days(100);
        store.insert(&old).await.unwrap();
        store.insert(&record("acme", "a@b.c")).await.unwrap();

        let removed = store
            .purge_older_than(Utc::now() - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }
}
