//! Backend selection for the cache gateway

use super::errors::CacheResult;
use super::moka::MokaCache;
use super::traits::CacheService;
use crate::config::CacheConfig;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Configured cache backend. `Disabled` answers every read with a miss and
/// accepts every write, so callers never branch on whether caching is on.
#[derive(Debug, Clone)]
pub enum CacheProvider {
    Moka(MokaCache),
    Disabled,
}

impl CacheProvider {
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Cache disabled; listings are always read from the store");
            return Self::Disabled;
        }
        info!(
            max_capacity = config.max_capacity,
            ttl_seconds = config.default_ttl_seconds,
            "Cache enabled (moka)"
        );
        Self::Moka(MokaCache::new(config.max_capacity))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Moka(_))
    }
}

#[async_trait]
impl CacheService for CacheProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            Self::Moka(cache) => cache.get(key).await,
            Self::Disabled => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            Self::Moka(cache) => cache.set(key, value, ttl).await,
            Self::Disabled => Ok(()),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        match self {
            Self::Moka(cache) => cache.delete(key).await,
            Self::Disabled => Ok(()),
        }
    }

    async fn flush_all(&self) -> CacheResult<()> {
        match self {
            Self::Moka(cache) => cache.flush_all().await,
            Self::Disabled => Ok(()),
        }
    }

    async fn ping(&self) -> CacheResult<bool> {
        match self {
            Self::Moka(cache) => cache.ping().await,
            Self::Disabled => Ok(true),
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            Self::Moka(cache) => cache.provider_name(),
            Self::Disabled => "disabled",
        }
    }
}
