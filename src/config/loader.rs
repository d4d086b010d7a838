//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources, lowest precedence first:
//! 1. Built-in defaults (`#[serde(default)]` on every section)
//! 2. TOML file from `--config`, `OPSGATE_CONFIG_PATH`, or `config/opsgate.toml`
//! 3. `OPSGATE__SECTION__KEY` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::OpsgateConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config/opsgate.toml";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: OpsgateConfig,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration, using `explicit_path` when given
    pub fn load(explicit_path: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let source_path = Self::resolve_config_path(explicit_path)?;

        let mut builder = Config::builder();
        if let Some(path) = &source_path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix("OPSGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let source_name = source_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let mut config: OpsgateConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::load_failed(&source_name, e))?;

        if let Some(environment) = Self::detect_environment() {
            config.service.environment = environment;
        }

        let manager = Self::from_config_with_source(config, source_path)?;
        info!(
            source = %source_name,
            environment = %manager.config.service.environment,
            database_backend = ?manager.config.database.backend,
            "Configuration loaded successfully"
        );
        debug!(config = %manager.config.sanitized(), "Effective configuration");
        Ok(manager)
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: OpsgateConfig) -> ConfigResult<Arc<ConfigManager>> {
        Self::from_config_with_source(config, None)
    }

    fn from_config_with_source(
        config: OpsgateConfig,
        source_path: Option<PathBuf>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source_path,
        }))
    }

    pub fn config(&self) -> &OpsgateConfig {
        &self.config
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn environment(&self) -> &str {
        &self.config.service.environment
    }

    /// Environment name from `OPSGATE_ENV`, falling back to `APP_ENV`
    pub fn detect_environment() -> Option<String> {
        env::var("OPSGATE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .ok()
            .filter(|e| !e.is_empty())
    }

    /// An explicit or env-provided path must exist; the default path is optional
    fn resolve_config_path(explicit_path: Option<PathBuf>) -> ConfigResult<Option<PathBuf>> {
        let requested = explicit_path.or_else(|| env::var("OPSGATE_CONFIG_PATH").ok().map(PathBuf::from));

        match requested {
            Some(path) if path.is_file() => Ok(Some(path)),
            Some(path) => Err(ConfigurationError::load_failed(
                path.display().to_string(),
                "configuration file does not exist",
            )),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                Ok(default.is_file().then_some(default))
            }
        }
    }
}
