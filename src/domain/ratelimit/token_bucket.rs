//! Token Bucket algorithm implementation

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    last_activity: Instant,
}

/// Token Bucket for rate limiting.
///
/// Tokens are refilled continuously at `refill_per_second` up to the bucket
/// capacity. Fractional refill is carried over between calls.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    /// Maximum bucket capacity
    capacity: f64,
    /// Tokens added per second
    refill_per_second: f64,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: now,
                last_activity: now,
            }),
            capacity: capacity as f64,
            refill_per_second,
        }
    }

    /// Bucket allowing `limit` events per minute with a burst of `limit`
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, limit as f64 / 60.0)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = now;
    }

    /// Try to consume one token from the bucket.
    /// Returns true if a token was available, false otherwise.
    pub fn try_consume(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);
        state.last_activity = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, Instant::now());
        state.tokens.floor() as u32
    }

    /// Time until the next token becomes available
    pub fn retry_after(&self) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, Instant::now());

        let missing = 1.0 - state.tokens;
        if missing <= 0.0 {
            Duration::ZERO
        } else if self.refill_per_second <= 0.0 {
            Duration::MAX
        } else {
            Duration::from_secs_f64(missing / self.refill_per_second)
        }
    }

    /// Time since the bucket was last used
    pub fn idle_for(&self) -> Duration {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.last_activity.elapsed()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bucket_has_full_capacity() {
        let bucket = TokenBucket::new(10, 1.0);
        assert_eq!(bucket.available(), 10);
        assert_eq!(bucket.capacity(), 10);
    }

    #[test]
    fn test_consume_until_empty() {
        let bucket = TokenBucket::new(3, 0.0);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        assert_eq!(bucket.retry_after(), Duration::MAX);
    }

    #[test]
    fn test_fractional_refill_accumulates() {
        // 20 tokens/s: one token every 50ms
        let bucket = TokenBucket::new(1, 20.0);
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        std::thread::sleep(Duration::from_millis(30));
        assert!(!bucket.try_consume());
        std::thread::sleep(Duration::from_millis(40));
        // 70ms elapsed in total across two partial refills
        assert!(bucket.try_consume());
    }

    #[test]
    fn test_retry_after_when_empty() {
        let bucket = TokenBucket::per_minute(1);
        assert!(bucket.try_consume());
        let wait = bucket.retry_after();
        assert!(wait > Duration::from_secs(55) && wait <= Duration::from_secs(60));
    }
}
