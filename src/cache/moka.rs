//! Process-local cache on `moka`
//!
//! Not shared between instances. Each entry carries its own TTL, so the user
//! operation listing and any future keys can expire independently.

use super::errors::CacheResult;
use super::traits::CacheService;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expiry policy reading the TTL stored alongside each value
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Clone)]
pub struct MokaCache {
    entries: Cache<String, Entry>,
    max_capacity: u64,
}

impl std::fmt::Debug for MokaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache")
            .field("max_capacity", &self.max_capacity)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl MokaCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(EntryTtl)
                .build(),
            max_capacity,
        }
    }
}

#[async_trait]
impl CacheService for MokaCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let hit = self.entries.get(key).await.map(|entry| entry.value);
        trace!(key = key, hit = hit.is_some(), "cache lookup");
        Ok(hit)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        trace!(key = key, ttl_ms = ttl.as_millis() as u64, "cache fill");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        Ok(())
    }

    async fn ping(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "moka"
    }
}
