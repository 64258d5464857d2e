//! Background maintenance tasks.
//!
//! Each task runs until the shutdown broadcast fires.

mod ratelimit_cleanup;
mod retention;

pub use ratelimit_cleanup::RateLimitCleanupTask;
pub use retention::RetentionTask;
