use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::domain::ratelimit::RateLimiter;

/// Drops token buckets of tenants that stopped sending
pub struct RateLimitCleanupTask {
    limiter: Arc<RateLimiter>,
    shutdown: broadcast::Receiver<()>,
}

impl RateLimitCleanupTask {
    pub fn new(limiter: Arc<RateLimiter>, shutdown: broadcast::Receiver<()>) -> Self {
        Self { limiter, shutdown }
    }

    pub async fn run(mut self) {
        if !self.limiter.is_enabled() {
            return;
        }

        let interval =
            Duration::from_secs(self.limiter.config().cleanup_interval_seconds.max(1));
        let mut timer = tokio::time::interval(interval);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = interval.as_secs(),
            bucket_ttl_secs = self.limiter.config().bucket_ttl_seconds,
            "Rate limit cleanup task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Rate limit cleanup task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.limiter.cleanup_stale();
                }
            }
        }

        tracing::info!("Rate limit cleanup task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ratelimit::RateLimitConfig;

    #[tokio::test]
    async fn test_disabled_limiter_returns_immediately() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let (_tx, rx) = broadcast::channel(1);

        tokio::time::timeout(
            Duration::from_secs(1),
            RateLimitCleanupTask::new(limiter, rx).run(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            enabled: true,
            ..Default::default()
        }));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(RateLimitCleanupTask::new(limiter, rx).run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
