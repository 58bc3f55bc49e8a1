//! Token-bucket rate limiter, one bucket per channel.
//!
//! State is process-local and resets on restart — admission control only
//! needs to be approximate across the fleet. The bucket map is the sole
//! piece of shared mutable memory in the delivery pipeline and lives
//! behind a mutex.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use paddock_core::clock::Clock;
use paddock_core::config::RateLimits;
use paddock_core::model::Channel;

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// Denied; retry no sooner than `delay_ms` from now.
    Denied { delay_ms: u64 },
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    limits: RateLimits,
    buckets: Mutex<HashMap<Channel, Bucket>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, limits: RateLimits) -> Self {
        Self { clock, limits, buckets: Mutex::new(HashMap::new()) }
    }

    /// Take one token from the channel's bucket, refilling first.
    pub async fn try_acquire(&self, channel: Channel) -> Admission {
        let config = self.limits.for_channel(channel);
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(channel)
            .or_insert_with(|| Bucket { tokens: config.max_tokens, last_refill: now });

        let elapsed_ms = (now - bucket.last_refill).num_milliseconds().max(0) as f64;
        bucket.tokens = (bucket.tokens + elapsed_ms * config.refill_per_ms()).min(config.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Admission::Granted
        } else {
            let delay_ms = ((1.0 - bucket.tokens) / config.refill_per_ms()).ceil() as u64;
            Admission::Denied { delay_ms }
        }
    }
}
