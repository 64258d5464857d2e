//! Graceful shutdown handling for the dispatch service.
//!
//! Runs after the HTTP server has stopped accepting requests:
//! 1. Signals background tasks to stop
//! 2. Waits for queued and running detached sends, up to the drain timeout
//! 3. Closes the database pool

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::dispatch::WorkerPool;
use crate::postgres::PostgresPool;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for detached sends to finish (default: 30 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ServerConfig> for ShutdownConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            drain_timeout: Duration::from_secs(config.shutdown_grace_seconds),
        }
    }
}

/// Handles graceful shutdown of the dispatch service
pub struct GracefulShutdown {
    pool: Arc<WorkerPool>,
    postgres_pool: Option<Arc<PostgresPool>>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        pool: Arc<WorkerPool>,
        postgres_pool: Option<Arc<PostgresPool>>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            pool,
            postgres_pool,
            shutdown_tx,
            config: ShutdownConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ShutdownConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(in_flight = self.pool.stats().in_flight, queued = self.pool.stats().queued)
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Signaling background tasks");
        // No receivers left is fine
        let _ = self.shutdown_tx.send(());

        tracing::info!(
            drain_timeout_secs = self.config.drain_timeout.as_secs(),
            "Phase 2: Draining detached sends"
        );
        result.pool_drained = self.pool.shutdown(self.config.drain_timeout).await;
        let stats = self.pool.stats();
        result.jobs_completed = stats.completed;
        result.jobs_abandoned = stats.queued + stats.in_flight;

        if let Some(pg) = &self.postgres_pool {
            tracing::info!("Phase 3: Closing database pool");
            pg.close().await;
        }

        result.duration = start.elapsed();
        result.success = result.pool_drained;

        tracing::info!(
            pool_drained = result.pool_drained,
            jobs_completed = result.jobs_completed,
            jobs_abandoned = result.jobs_abandoned,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every detached send finished in time
    pub success: bool,
    pub pool_drained: bool,
    /// Detached sends finished over the process lifetime
    pub jobs_completed: u64,
    /// Detached sends still queued or running at the deadline
    pub jobs_abandoned: usize,
    pub duration: Duration,
}
