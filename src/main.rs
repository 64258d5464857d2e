use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use ara_dispatch::config::{is_production, run_mode, Settings, StorageBackend};
use ara_dispatch::domain::vault::CredentialVault;
use ara_dispatch::postgres::PostgresPool;
use ara_dispatch::server::{create_app, AppState};
use ara_dispatch::shutdown::{GracefulShutdown, ShutdownConfig};
use ara_dispatch::tasks::{RateLimitCleanupTask, RetentionTask};
use ara_dispatch::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Keep the guard alive until exit so pending spans are flushed
    let _telemetry = init_telemetry(&settings.otel, &settings.logging)?;
    tracing::info!(run_mode = %run_mode(), "Configuration loaded");

    // Production refuses to start without a real encryption key
    let vault = CredentialVault::from_config(settings.encryption.key.as_deref(), is_production())
        .context("invalid encryption configuration")?;

    let postgres_pool = match settings.database.backend {
        StorageBackend::Postgres => match PostgresPool::new(&settings.database).await {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                tracing::error!(error = %e, "PostgreSQL unavailable, falling back to memory storage");
                None
            }
        },
        StorageBackend::Memory => None,
    };

    // Create application state
    let state = AppState::new(settings.clone(), vault, postgres_pool.clone())?;
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let retention_task = RetentionTask::new(
        settings.retention.clone(),
        Arc::clone(state.delivery.store()),
        shutdown_tx.subscribe(),
    );
    let retention_handle = tokio::spawn(retention_task.run());

    let cleanup_task =
        RateLimitCleanupTask::new(Arc::clone(&state.rate_limiter), shutdown_tx.subscribe());
    let cleanup_handle = tokio::spawn(cleanup_task.run());

    let shutdown = GracefulShutdown::new(Arc::clone(&state.pool), postgres_pool, shutdown_tx)
        .with_config(ShutdownConfig::from(&settings.server));

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    // Stop accepting requests first, then drain detached sends
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let result = shutdown.execute("server stopping").await;
    if !result.success {
        tracing::warn!(
            abandoned = result.jobs_abandoned,
            "Detached sends still running at shutdown"
        );
    }

    // Wait for background tasks to finish
    let _ = tokio::join!(retention_handle, cleanup_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
