//! PostgreSQL persistence module.
//!
//! Provides connection pooling for the PostgreSQL storage backends.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
