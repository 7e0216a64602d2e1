//! Bandwidth throttling for sync transfers.
//!
//! Rate limiting uses a token bucket where one token is one KiB.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;

const TOKEN_BYTES: u64 = 1024;

/// Bandwidth limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandwidthLimit {
    /// Bytes per second, 0 meaning unlimited.
    pub bytes_per_second: u64,
}

impl BandwidthLimit {
    pub fn new(bytes_per_second: u64) -> Self {
        Self { bytes_per_second }
    }

    pub fn unlimited() -> Self {
        Self { bytes_per_second: 0 }
    }

    pub fn is_limited(&self) -> bool {
        self.bytes_per_second > 0
    }

    /// Format as human-readable string.
    pub fn display(&self) -> String {
        if !self.is_limited() {
            return "unlimited".to_string();
        }

        let bps = self.bytes_per_second;
        if bps >= 1_000_000_000 {
            format!("{:.1} GB/s", bps as f64 / 1_000_000_000.0)
        } else if bps >= 1_000_000 {
            format!("{:.1} MB/s", bps as f64 / 1_000_000.0)
        } else if bps >= 1_000 {
            format!("{:.1} KB/s", bps as f64 / 1_000.0)
        } else {
            format!("{} B/s", bps)
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared byte-rate limiter. Clones draw from the same bucket.
#[derive(Clone, Default)]
pub struct BandwidthLimiter {
    limiter: Option<Arc<DirectLimiter>>,
    limit: BandwidthLimit,
}

impl std::fmt::Debug for BandwidthLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandwidthLimiter")
            .field("limit", &self.limit.display())
            .finish()
    }
}

impl BandwidthLimiter {
    pub fn new(limit: BandwidthLimit) -> Self {
        let per_second = (limit.bytes_per_second / TOKEN_BYTES).clamp(1, u32::MAX as u64) as u32;

        let limiter = NonZeroU32::new(per_second)
            .filter(|_| limit.is_limited())
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        Self { limiter, limit }
    }

    pub fn unlimited() -> Self {
        Self::new(BandwidthLimit::unlimited())
    }

    pub fn limit(&self) -> BandwidthLimit {
        self.limit
    }

    /// Wait until `bytes` may be transferred. No-op when unlimited.
    pub async fn acquire(&self, bytes: u64) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let tokens = bytes.div_ceil(TOKEN_BYTES).max(1);
        for _ in 0..tokens {
            limiter.until_ready().await;
        }
    }
}
