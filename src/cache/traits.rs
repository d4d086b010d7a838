//! Key-value contract behind the cache gateway

use super::errors::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// String-valued store with per-entry expiry. Structured values are encoded
/// by the caller (`ProtectedCache::get_json` / `set_json`).
#[async_trait]
pub trait CacheService: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Insert or replace; the entry expires `ttl` after this write
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn flush_all(&self) -> CacheResult<()>;

    /// `Ok(false)` when the backend answers but reports itself unusable
    async fn ping(&self) -> CacheResult<bool>;

    fn provider_name(&self) -> &'static str;
}
