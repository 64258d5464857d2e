//! Send rate limiting.
//!
//! Each tenant gets one token bucket per channel. Sends that find the bucket
//! empty fail with `RateLimited` and are not retried.

mod config;
mod limiter;
mod token_bucket;

pub use config::RateLimitConfig;
pub use limiter::{RateLimitResult, RateLimiter};
pub use token_bucket::TokenBucket;
