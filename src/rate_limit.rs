//! Per-client request limiting over a trailing time window.
//!
//! Each client key owns the timestamps of its admitted requests. On every
//! check the timestamps older than the window are dropped and the remainder
//! is compared against the limit. State lives only in this process.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::debug;

use crate::metrics::RATE_LIMIT_KEYS;

pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    // client key -> timestamps of admitted requests, oldest first
    entries: DashMap<String, VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a request for `key` and returns whether it is allowed.
    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    ///
    /// A rejected request is not recorded, so a client that keeps hammering
    /// is admitted again as soon as its oldest admitted request ages out.
    pub fn admit_at(&self, key: &str, now: Instant) -> bool {
        // The entry guard holds the shard lock for the whole prune/check/push.
        let mut timestamps = self.entries.entry(key.to_string()).or_default();
        prune(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests as usize {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Drops every key with no timestamp left inside the window.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        let removed = before.saturating_sub(self.entries.len());
        RATE_LIMIT_KEYS.set(self.entries.len() as f64);
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Window rendered for the `retryAfter` field of a 429 body.
    pub fn retry_after(&self) -> String {
        let secs = self.window.as_secs();
        match secs {
            60 => "1 minute".to_string(),
            s if s >= 60 && s % 60 == 0 => format!("{} minutes", s / 60),
            1 => "1 second".to_string(),
            s => format!("{} seconds", s),
        }
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = timestamps.front() {
        if now.saturating_duration_since(oldest) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

// Sweeper task - evicts idle client keys so the map does not grow forever
pub async fn sweep_expired(limiter: Arc<RateLimiter>, every: Duration) {
    let mut interval = interval(every);

    loop {
        interval.tick().await;
        let removed = limiter.purge_expired(Instant::now());
        if removed > 0 {
            debug!(
                removed,
                remaining = limiter.tracked_keys(),
                "Evicted idle rate limit keys"
            );
        }
    }
}
