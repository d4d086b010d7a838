//! # Web API Application State
//!
//! Shared state handed to every handler and middleware. Everything inside is
//! either immutable or synchronizes itself, so cloning the state per request
//! only bumps reference counts.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::auth::{CredentialStore, JwtAuthenticator};
use crate::batch::{BatchProcessor, EntityRegistry};
use crate::cache::{CacheProvider, ProtectedCache};
use crate::config::OpsgateConfig;
use crate::errors::OpsgateResult;
use crate::external::{ExternalService, SimulatedDependency};
use crate::metrics::ApiMetrics;
use crate::rate_limit::RateLimiters;
use crate::resilience::CircuitBreakerManager;
use crate::store::{create_gateway, PersistenceGateway};

/// Dependency key of the breaker guarding the cache gateway
pub const CACHE_DEPENDENCY: &str = "cache";

/// Dependency key of the default external service
pub const EXTERNAL_DEPENDENCY: &str = "failing-service";

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<OpsgateConfig>,
    pub store: Arc<dyn PersistenceGateway>,
    pub batch_processor: Arc<BatchProcessor>,
    pub authenticator: Arc<JwtAuthenticator>,
    pub credentials: Arc<CredentialStore>,
    pub rate_limiters: Arc<RateLimiters>,
    pub circuit_breakers: Arc<CircuitBreakerManager>,
    pub cache: ProtectedCache,
    pub external: Arc<dyn ExternalService>,
    pub metrics: ApiMetrics,
    pub started_at: Instant,
}

impl AppState {
    pub fn builder(config: OpsgateConfig) -> AppStateBuilder {
        AppStateBuilder::new(config)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Wires the components together. Store and external service can be
/// replaced, which is how tests inject counting or failing doubles.
pub struct AppStateBuilder {
    config: OpsgateConfig,
    store: Option<Arc<dyn PersistenceGateway>>,
    external: Option<Arc<dyn ExternalService>>,
}

impl AppStateBuilder {
    pub fn new(config: OpsgateConfig) -> Self {
        Self {
            config,
            store: None,
            external: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PersistenceGateway>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_external_service(mut self, external: Arc<dyn ExternalService>) -> Self {
        self.external = Some(external);
        self
    }

    pub async fn build(self) -> OpsgateResult<AppState> {
        let config = self.config;
        config.validate()?;

        let metrics = ApiMetrics::new()?;

        let store = match self.store {
            Some(store) => store,
            None => create_gateway(&config.database).await?,
        };

        let circuit_breakers = Arc::new(
            CircuitBreakerManager::new(config.circuit_breakers.clone())
                .with_exporter(metrics.clone()),
        );

        let cache = ProtectedCache::new(
            CacheProvider::from_config(&config.cache),
            circuit_breakers.get_circuit_breaker(CACHE_DEPENDENCY),
            config.cache.default_ttl(),
        );

        let external: Arc<dyn ExternalService> = match self.external {
            Some(external) => external,
            None => Arc::new(SimulatedDependency::from_config(
                EXTERNAL_DEPENDENCY,
                &config.external,
            )),
        };
        // register up front so the breaker shows in /ready and /metrics before first use
        circuit_breakers.get_circuit_breaker(external.name());

        let batch_processor = Arc::new(
            BatchProcessor::new(
                Arc::clone(&store),
                EntityRegistry::from_config(&config.batch),
                config.batch.max_operations,
            )
            .with_metrics(metrics.clone()),
        );

        let authenticator = Arc::new(JwtAuthenticator::from_config(&config.auth)?);
        let credentials = Arc::new(CredentialStore::new(&config.auth.users));
        let rate_limiters = Arc::new(RateLimiters::from_config(&config.rate_limiting));

        info!(
            backend = store.backend_name(),
            cache = cache.provider_name(),
            external = external.name(),
            users = credentials.len(),
            rate_limiting = rate_limiters.is_enabled(),
            "Application state initialized"
        );

        Ok(AppState {
            config: Arc::new(config),
            store,
            batch_processor,
            authenticator,
            credentials,
            rate_limiters,
            circuit_breakers,
            cache,
            external,
            metrics,
            started_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_state_builds() {
        let state = AppState::builder(OpsgateConfig::default())
            .build()
            .await
            .unwrap();

        assert_eq!(state.store.backend_name(), "memory");
        assert_eq!(state.external.name(), EXTERNAL_DEPENDENCY);
        assert_eq!(
            state.circuit_breakers.list_components(),
            vec![CACHE_DEPENDENCY.to_string(), EXTERNAL_DEPENDENCY.to_string()]
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = OpsgateConfig::default();
        config.batch.max_operations = 0;
        assert!(AppState::builder(config).build().await.is_err());
    }
}
