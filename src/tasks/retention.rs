use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::RetentionConfig;
use crate::domain::notification::NotificationStore;
use crate::domain::store::StoreError;
use crate::metrics::RetentionMetrics;

/// Periodically deletes notification records older than the retention window
pub struct RetentionTask {
    config: RetentionConfig,
    store: Arc<dyn NotificationStore>,
    shutdown: broadcast::Receiver<()>,
}

impl RetentionTask {
    pub fn new(
        config: RetentionConfig,
        store: Arc<dyn NotificationStore>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            store,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        if self.config.days == 0 {
            tracing::info!("Notification retention disabled, records are kept forever");
            return;
        }

        let interval = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));
        let mut timer = tokio::time::interval(interval);

        tracing::info!(
            retention_days = self.config.days,
            interval_secs = interval.as_secs(),
            backend = self.store.backend_type(),
            "Retention task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Retention task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    if let Err(e) = self.purge_once().await {
                        tracing::warn!(error = %e, "Notification retention purge failed");
                    }
                }
            }
        }

        tracing::info!("Retention task stopped");
    }

    /// Delete everything older than the window; returns the number removed
    pub async fn purge_once(&self) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.config.days));
        let purged = self.store.purge_older_than(cutoff).await?;

        if purged > 0 {
            RetentionMetrics::record_purged(purged);
            tracing::info!(
                purged = purged,
                cutoff = %cutoff,
                "Purged expired notification records"
            );
        }
        Ok(purged)
    }
}
