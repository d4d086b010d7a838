//! # Rate Limiting
//!
//! One [`RateLimiter`] per key scheme. Routes choose the scheme:
//! protected API calls count per authenticated client, public entry points
//! per client IP, and calls to the guarded external dependency globally.

pub mod limiter;

pub use limiter::{Admission, RateLimitWindow, RateLimiter};

use crate::config::RateLimitingConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Key scheme a route is limited by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    PerClient,
    PerIp,
    Global,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::PerClient => "per_client",
            RateLimitScope::PerIp => "per_ip",
            RateLimitScope::Global => "global",
        }
    }
}

/// The limiters for every scope, shared by all requests
#[derive(Debug)]
pub struct RateLimiters {
    enabled: bool,
    per_client: RateLimiter,
    per_ip: RateLimiter,
    global: RateLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self {
            enabled: config.enabled,
            per_client: RateLimiter::new("per_client", config.per_client),
            per_ip: RateLimiter::new("per_ip", config.per_ip),
            global: RateLimiter::new("global", config.global),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn limiter(&self, scope: RateLimitScope) -> &RateLimiter {
        match scope {
            RateLimitScope::PerClient => &self.per_client,
            RateLimitScope::PerIp => &self.per_ip,
            RateLimitScope::Global => &self.global,
        }
    }

    /// `None` when rate limiting is disabled
    pub fn check(&self, scope: RateLimitScope, key: &str) -> Option<Admission> {
        self.enabled.then(|| self.limiter(scope).admit(key))
    }

    pub fn sweep(&self) -> usize {
        [&self.per_client, &self.per_ip, &self.global]
            .iter()
            .map(|limiter| limiter.sweep())
            .sum()
    }

    /// Periodically evict expired windows so idle keys do not accumulate
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiters = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiters.sweep();
                if evicted > 0 {
                    debug!(evicted, "Evicted expired rate limit windows");
                }
            }
        })
    }
}
