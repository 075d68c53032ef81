//! Per-IP token-bucket rate limiting for the signaling and listing routes.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use livertc_core::config::RateLimitConfig;

struct Bucket {
    tokens: f64,
    last: Instant,
}

pub struct RateLimiter {
    rps: f64,
    burst: f64,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    /// Returns `None` when rate limiting is disabled (`rps <= 0`). A zero
    /// burst is treated as 1 so a configured limiter always admits at
    /// least single requests.
    pub fn from_config(cfg: &RateLimitConfig) -> Option<Arc<Self>> {
        if cfg.rps <= 0.0 {
            return None;
        }
        let burst = if cfg.burst == 0 { 1 } else { cfg.burst };
        Some(Arc::new(Self {
            rps: cfg.rps,
            burst: f64::from(burst),
            buckets: Mutex::new(HashMap::new()),
        }))
    }

    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: self.burst,
            last: now,
        });

        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(self.burst);
        bucket.last = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
