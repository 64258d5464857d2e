//! Shared error type for the persistence backends.

use thiserror::Error;

/// Errors raised by template and notification storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    /// A conditional write found the record in a different state
    #[error("Record changed concurrently: {0}")]
    Stale(String),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
