//! # Opsgate Configuration System
//!
//! Layered configuration: an optional TOML file overridden by `OPSGATE__*`
//! environment variables. Every field carries a default so a bare
//! environment boots a working development service.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use opsgate_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load(None)?;
//! let limit = manager.config().rate_limiting.per_client.limit;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/opsgate.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OpsgateConfig {
    pub service: ServiceConfig,
    pub web: WebConfig,
    pub auth: AuthConfig,
    pub rate_limiting: RateLimitingConfig,
    pub circuit_breakers: CircuitBreakersConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub external: ExternalConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name reported by the health and readiness endpoints
    pub name: String,
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "opsgate".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub request_timeout_ms: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl WebConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// A user allowed to obtain tokens through the login endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserCredential {
    pub id: String,
    pub email: String,
    /// Lowercase hex SHA-256 digest of the password
    pub password_sha256: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_expiry_seconds: u64,
    pub users: Vec<UserCredential>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "development-only-secret-change-me".to_string(),
            jwt_issuer: "opsgate".to_string(),
            jwt_audience: "opsgate-api".to_string(),
            token_expiry_seconds: 3600,
            users: Vec::new(),
        }
    }
}

/// Limit and window for one rate-limit scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub sweep_interval_seconds: u64,
    pub per_client: RateLimitPolicy,
    pub per_ip: RateLimitPolicy,
    pub global: RateLimitPolicy,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: 60,
            per_client: RateLimitPolicy::new(100, 60),
            per_ip: RateLimitPolicy::new(300, 60),
            global: RateLimitPolicy::new(1000, 60),
        }
    }
}

impl RateLimitingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Thresholds for a single guarded dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Failures within the rolling window that open the circuit
    pub failure_threshold: u32,
    pub failure_window_seconds: u64,
    /// Time spent open before a trial call is allowed
    pub cooldown_seconds: u64,
    pub call_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_seconds: 60,
            cooldown_seconds: 30,
            call_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakersConfig {
    pub default: BreakerSettings,
    /// Per-dependency overrides keyed by dependency name
    pub dependencies: HashMap<String, BreakerSettings>,
}

impl CircuitBreakersConfig {
    pub fn settings_for(&self, dependency: &str) -> BreakerSettings {
        self.dependencies
            .get(dependency)
            .copied()
            .unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    /// Create the entity table on startup (postgres only)
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Memory,
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 5,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_capacity: u64,
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            default_ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub known_entities: Vec<String>,
    pub max_operations: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            known_entities: ["user", "operation", "product", "order"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_operations: 100,
        }
    }
}

/// Behaviour of the simulated external dependency behind
/// `/api/v1/external/failing-service`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalFailureMode {
    AlwaysFail,
    NeverFail,
    /// Fails when the request payload carries `"fail": true`
    PayloadDriven,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub failure_mode: ExternalFailureMode,
    pub simulated_latency_ms: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            failure_mode: ExternalFailureMode::AlwaysFail,
            simulated_latency_ms: 0,
        }
    }
}

/// Longest token lifetime accepted from configuration (30 days)
pub const MAX_TOKEN_EXPIRY_SECONDS: u64 = 30 * 24 * 60 * 60;

impl OpsgateConfig {
    /// Validate configuration values that serde alone cannot enforce
    pub fn validate(&self) -> ConfigResult<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "jwt_secret",
                "auth",
            ));
        }
        if self.auth.token_expiry_seconds == 0
            || self.auth.token_expiry_seconds > MAX_TOKEN_EXPIRY_SECONDS
        {
            return Err(ConfigurationError::invalid_value(
                "auth.token_expiry_seconds",
                self.auth.token_expiry_seconds.to_string(),
                format!("token expiry must be between 1 and {MAX_TOKEN_EXPIRY_SECONDS} seconds"),
            ));
        }
        for user in &self.auth.users {
            let digest = &user.password_sha256;
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigurationError::invalid_value(
                    "auth.users.password_sha256",
                    user.email.clone(),
                    "must be a 64 character hex SHA-256 digest",
                ));
            }
        }

        for (scope, policy) in [
            ("per_client", &self.rate_limiting.per_client),
            ("per_ip", &self.rate_limiting.per_ip),
            ("global", &self.rate_limiting.global),
        ] {
            if policy.limit == 0 || policy.window_seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("rate_limiting.{scope}"),
                    format!("{}/{}s", policy.limit, policy.window_seconds),
                    "limit and window_seconds must be greater than 0",
                ));
            }
        }
        if self.rate_limiting.sweep_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "rate_limiting.sweep_interval_seconds",
                "0",
                "sweep interval must be greater than 0",
            ));
        }

        let breakers = std::iter::once(("default", &self.circuit_breakers.default)).chain(
            self.circuit_breakers
                .dependencies
                .iter()
                .map(|(name, settings)| (name.as_str(), settings)),
        );
        for (name, settings) in breakers {
            if settings.failure_threshold == 0
                || settings.failure_window_seconds == 0
                || settings.cooldown_seconds == 0
                || settings.call_timeout_ms == 0
            {
                return Err(ConfigurationError::invalid_value(
                    format!("circuit_breakers.{name}"),
                    format!("{settings:?}"),
                    "thresholds, windows, cooldowns and timeouts must be greater than 0",
                ));
            }
        }

        if self.database.backend == DatabaseBackend::Postgres
            && self.database.url.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigurationError::missing_required_field(
                "url",
                "database (postgres backend)",
            ));
        }

        if self.batch.known_entities.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "known_entities",
                "batch",
            ));
        }
        if self.batch.max_operations == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.max_operations",
                "0",
                "a batch must allow at least one operation",
            ));
        }

        Ok(())
    }

    /// Configuration rendered as JSON with secrets masked, for logging
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        mask_sensitive(&mut value);
        value
    }
}

fn mask_sensitive(value: &mut serde_json::Value) {
    const SENSITIVE: [&str; 4] = ["secret", "password", "url", "token"];

    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = SENSITIVE.iter().any(|p| key_lower.contains(p))
                    && !key_lower.ends_with("_seconds");
                if is_sensitive && (val.is_string() || val.is_number()) {
                    *val = serde_json::Value::String("[MASKED]".to_string());
                } else {
                    mask_sensitive(val);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(mask_sensitive),
        _ => {}
    }
}
