//! Circuit breaker protected cache
//!
//! Cache calls go through the `cache` circuit breaker. When the circuit is
//! open the cache degrades instead of failing the request:
//! - `get()` returns `Ok(None)` (miss)
//! - `set()` / `delete()` / `flush_all()` return `Ok(())` (no-op)
//! - `ping()` returns `Ok(false)` (unhealthy)
//!
//! Read-through fills race with invalidations: a reader that loaded rows
//! before a write committed must not cache them after the write invalidated
//! the key. Each key has an invalidation generation; fills go through
//! [`ProtectedCache::set_json_if_current`] with the generation read before
//! the backing load.

use super::errors::{CacheError, CacheResult};
use super::provider::CacheProvider;
use super::traits::CacheService;
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState};
use serde::de::DeserializeOwned;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProtectedCache {
    inner: CacheProvider,
    circuit_breaker: Arc<CircuitBreaker>,
    default_ttl: Duration,
    generations: Arc<DashMap<String, u64>>,
}

/// Outcome of a guarded cache call: `None` when the circuit short-circuited it
fn unwrap_guarded<T>(
    result: Result<T, CircuitBreakerError<CacheError>>,
) -> CacheResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CircuitBreakerError::CircuitOpen { .. }) => Ok(None),
        Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        Err(CircuitBreakerError::Timeout { timeout_ms, .. }) => {
            Err(CacheError::Timeout { timeout_ms })
        }
    }
}

impl ProtectedCache {
    pub fn new(
        provider: CacheProvider,
        circuit_breaker: Arc<CircuitBreaker>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            inner: provider,
            circuit_breaker,
            default_ttl,
            generations: Arc::new(DashMap::new()),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let result = self.circuit_breaker.call(|| self.inner.get(key)).await;
        match unwrap_guarded(result)? {
            Some(value) => Ok(value),
            None => {
                debug!(key = key, "Cache circuit open, returning miss");
                Ok(None)
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let result = self
            .circuit_breaker
            .call(|| self.inner.set(key, value, ttl))
            .await;
        if unwrap_guarded(result)?.is_none() {
            debug!(key = key, "Cache circuit open, skipping set");
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let result = self.circuit_breaker.call(|| self.inner.delete(key)).await;
        if unwrap_guarded(result)?.is_none() {
            debug!(key = key, "Cache circuit open, skipping delete");
        }
        Ok(())
    }

    pub async fn flush_all(&self) -> CacheResult<()> {
        let result = self.circuit_breaker.call(|| self.inner.flush_all()).await;
        if unwrap_guarded(result)?.is_none() {
            debug!("Cache circuit open, skipping flush");
        }
        Ok(())
    }

    pub async fn ping(&self) -> CacheResult<bool> {
        let result = self
            .circuit_breaker
            .call(|| async {
                match self.inner.ping().await {
                    Ok(true) => Ok(true),
                    Ok(false) => Err(CacheError::Unavailable("ping failed".to_string())),
                    Err(e) => Err(e),
                }
            })
            .await;
        match result {
            Ok(healthy) => Ok(healthy),
            Err(CircuitBreakerError::CircuitOpen { .. }) => Ok(false),
            Err(e) => {
                warn!(error = %e, "Cache ping failed");
                Ok(false)
            }
        }
    }

    /// Best-effort typed read; undecodable entries count as misses
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Best-effort typed write with the default TTL; errors are logged, never returned
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize cache value");
                return;
            }
        };
        if let Err(e) = self.set(key, &raw, self.default_ttl).await {
            warn!(key = key, error = %e, "Cache write failed");
        }
    }

    /// Invalidation count for `key`, read before loading the value to cache
    pub fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).map_or(0, |g| *g)
    }

    /// Fill `key` unless it was invalidated since `generation` was read
    pub async fn set_json_if_current<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        generation: u64,
    ) {
        if self.generation(key) != generation {
            debug!(key = key, "Key invalidated during load, skipping cache fill");
            return;
        }
        self.set_json(key, value).await;

        // an invalidation between the check and the write may have deleted first
        if self.generation(key) != generation {
            debug!(key = key, "Key invalidated during cache fill, discarding entry");
            self.evict(key).await;
        }
    }

    /// Best-effort invalidation; bumps the generation before deleting
    pub async fn invalidate(&self, key: &str) {
        *self.generations.entry(key.to_string()).or_insert(0) += 1;
        self.evict(key).await;
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.delete(key).await {
            warn!(key = key, error = %e, "Cache invalidation failed");
        }
    }
}
