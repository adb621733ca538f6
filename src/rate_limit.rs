//! Per-client sliding-window rate limiting.
//!
//! Each client key owns an ordered list of accepted-request timestamps.
//! A check prunes everything older than the window, rejects if the survivors
//! already fill the quota, and records the new timestamp otherwise. Rejected
//! requests are never recorded.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rate limit exceeded")]
pub struct RateLimitExceeded {
    // seconds until the oldest counted request leaves the window
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    buckets: DashMap<String, Vec<Instant>>,
    max_requests: i64,
    window: Duration,
}

impl RateLimiter {
    // max_requests <= 0 disables limiting entirely
    pub fn new(max_requests: i64, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn check_and_record(&self, client_key: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(client_key, Instant::now())
    }

    fn check_at(&self, client_key: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        if self.max_requests <= 0 {
            return Ok(());
        }

        // the entry guard holds its shard lock until dropped, so the
        // check-then-append below is atomic per key
        let mut stamps = self.buckets.entry(client_key.to_string()).or_default();
        stamps.retain(|t| now.duration_since(*t) < self.window);

        if stamps.len() >= self.max_requests as usize {
            // stamps are appended in order, so the front is the oldest
            let oldest = stamps[0];
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Err(RateLimitExceeded {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        stamps.push(now);
        Ok(())
    }

    // drop buckets whose every timestamp has aged out of the window;
    // runs from a background task so idle clients do not pin memory forever
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        self.buckets
            .retain(|_, stamps| stamps.iter().any(|t| now.duration_since(*t) < self.window));
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
