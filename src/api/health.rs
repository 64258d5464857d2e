//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::dispatch::PoolStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: StorageHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresHealthResponse>,
    pub workers: PoolStats,
    pub encryption: EncryptionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct StorageHealthResponse {
    pub templates: String,
    pub notifications: String,
}

#[derive(Debug, Serialize)]
pub struct PostgresHealthResponse {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct EncryptionHealthResponse {
    /// True while the development key is in use
    pub placeholder_key: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let postgres = match state.postgres_pool {
        Some(ref pool) => {
            let inner_pool = pool.pool();
            Some(PostgresHealthResponse {
                connected: pool.ping().await.is_ok(),
                pool_size: inner_pool.size(),
                idle_connections: inner_pool.num_idle() as u32,
            })
        }
        None => None,
    };

    let workers = state.pool.stats();
    let degraded = state.pool.is_closed() || postgres.as_ref().is_some_and(|pg| !pg.connected);
    let status = if degraded { "degraded" } else { "healthy" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        storage: StorageHealthResponse {
            templates: state.resolver.store().backend_type().to_string(),
            notifications: state.delivery.store().backend_type().to_string(),
        },
        postgres,
        workers,
        encryption: EncryptionHealthResponse {
            placeholder_key: state.vault.is_placeholder(),
        },
    })
}
