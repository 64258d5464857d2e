//! Per-tenant, per-channel send rate limiter

use std::time::Duration;

use dashmap::DashMap;

use crate::domain::notification::ChannelType;

use super::config::RateLimitConfig;
use super::token_bucket::TokenBucket;

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    /// Send is allowed
    Allowed { remaining: u32, limit: u32 },
    /// Send is denied
    Denied { retry_after: Duration, limit: u32 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Token-bucket limiter keyed by `tenant:channel`
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume one send from the tenant's budget on `channel`
    pub fn check(&self, tenant_id: &str, channel: ChannelType) -> RateLimitResult {
        let limit = self.config.limit_for(channel);
        if !self.config.enabled {
            return RateLimitResult::Allowed {
                remaining: u32::MAX,
                limit,
            };
        }

        let key = format!("{}:{}", tenant_id, channel);
        let entry = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::per_minute(limit));
        let bucket = entry.value();

        if bucket.try_consume() {
            RateLimitResult::Allowed {
                remaining: bucket.available(),
                limit,
            }
        } else {
            RateLimitResult::Denied {
                retry_after: bucket.retry_after(),
                limit,
            }
        }
    }

    /// Clean up buckets that haven't been used recently
    pub fn cleanup_stale(&self) -> usize {
        let ttl = Duration::from_secs(self.config.bucket_ttl_seconds);
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.idle_for() < ttl);
        let removed = before.saturating_sub(self.buckets.len());

        if removed > 0 {
            tracing::debug!(
                removed = removed,
                remaining = self.buckets.len(),
                "Cleaned up stale rate limit buckets"
            );
        }
        removed
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
