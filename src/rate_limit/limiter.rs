//! Fixed-window request counting per client key.
//!
//! Each key owns its own mutex; the `DashMap` shard lock is released before
//! that mutex is taken, so admissions for different keys never wait on each
//! other and increments for one key are never lost.

use crate::config::RateLimitPolicy;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Rejected {
        limit: u32,
        retry_after_seconds: u64,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Counter for one key
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    pub window_start: Instant,
    pub count: u32,
    pub limit: u32,
    pub window_duration: Duration,
}

impl RateLimitWindow {
    pub fn new(policy: RateLimitPolicy, now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit: policy.limit,
            window_duration: policy.window(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window_duration
    }

    fn remaining_time(&self, now: Instant) -> Duration {
        self.window_duration
            .saturating_sub(now.saturating_duration_since(self.window_start))
    }

    /// Count one request at `now`. An expired window restarts with this
    /// request as its first.
    pub fn admit_at(&mut self, now: Instant) -> Admission {
        if self.is_expired(now) {
            self.window_start = now;
            self.count = 0;
        }

        if self.count < self.limit {
            self.count += 1;
            Admission::Admitted {
                limit: self.limit,
                remaining: self.limit - self.count,
                reset_after: self.remaining_time(now),
            }
        } else {
            let remaining = self.remaining_time(now);
            let retry_after_seconds =
                (remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)).max(1);
            Admission::Rejected {
                limit: self.limit,
                retry_after_seconds,
            }
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    policy: RateLimitPolicy,
    windows: DashMap<String, Arc<Mutex<RateLimitWindow>>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: RateLimitPolicy) -> Self {
        Self {
            name,
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let window = match self.windows.get(key) {
            Some(existing) => Arc::clone(existing.value()),
            None => Arc::clone(
                self.windows
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(RateLimitWindow::new(self.policy, now))))
                    .value(),
            ),
        };

        let admission = window.lock().admit_at(now);
        if let Admission::Rejected {
            retry_after_seconds,
            ..
        } = admission
        {
            debug!(
                limiter = self.name,
                key = key,
                limit = self.policy.limit,
                retry_after_seconds,
                "Rate limit exceeded"
            );
        }
        admission
    }

    /// Drop expired windows nobody is using; returns how many were removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            // a clone outside the map means an admission is in progress
            Arc::strong_count(window) > 1 || !window.lock().is_expired(now)
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
