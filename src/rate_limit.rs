//! Per-address fixed-window rate limiting.
//!
//! Counters live in the shared store under `rl:<address>:<window>` so every
//! worker instance sees the same budget. Windows are clock-aligned, which
//! means a burst straddling a boundary can pass up to twice the limit within
//! sixty seconds.

use std::sync::Arc;
use tracing::debug;

use crate::analytics::keys;
use crate::clock::Clock;
use crate::storage::{parse_count, CounterStore, StorageResult};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests allowed per address per window
    pub max_requests: u64,
    /// Window length in milliseconds
    pub window_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    /// Denied requests do not touch the counter.
    pub async fn allow(&self, address: &str) -> StorageResult<bool> {
        let window = self.clock.window_index(self.config.window_ms);
        let key = keys::rate_limit(address, window);

        let count = parse_count(self.store.get(&key).await?.as_deref());
        if count >= self.config.max_requests {
            debug!(address, window, count, "rate limit exceeded");
            return Ok(false);
        }

        self.store.increment(&key, keys::RATE_LIMIT_TTL).await?;
        Ok(true)
    }
}
