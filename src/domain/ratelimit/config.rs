//! Rate limiting configuration

use serde::Deserialize;

use crate::domain::notification::ChannelType;

/// Configuration for per-tenant send rate limiting
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Email sends per minute per tenant (also the burst size)
    #[serde(default = "default_email_per_minute")]
    pub email_per_minute: u32,
    /// SMS sends per minute per tenant (also the burst size)
    #[serde(default = "default_sms_per_minute")]
    pub sms_per_minute: u32,
    /// Cleanup interval for stale buckets in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Time after which unused buckets are removed (seconds)
    #[serde(default = "default_bucket_ttl")]
    pub bucket_ttl_seconds: u64,
}

fn default_email_per_minute() -> u32 {
    600
}

fn default_sms_per_minute() -> u32 {
    60
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_bucket_ttl() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            email_per_minute: default_email_per_minute(),
            sms_per_minute: default_sms_per_minute(),
            cleanup_interval_seconds: default_cleanup_interval(),
            bucket_ttl_seconds: default_bucket_ttl(),
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, channel: ChannelType) -> u32 {
        match channel {
            ChannelType::Email => self.email_per_minute,
            ChannelType::Sms => self.sms_per_minute,
        }
    }
}
