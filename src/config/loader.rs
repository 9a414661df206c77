//! Configuration Loader
//!
//! Layers defaults, `orchestrator.*` files, environment-specific overrides and
//! `ORCHESTRATOR_*` environment variables, in that order of precedence.

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestratorConfig;
use crate::constants::{CONFIG_FILE_STEM, ENV_PREFIX};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: OrchestratorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        if explicit && !config_directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound {
                path: config_directory,
            });
        }

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        debug!(
            environment = environment,
            module_timeout_ms = config.module_timeout_ms,
            max_concurrent_executions = config.max_concurrent_executions,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build(directory: &Path, environment: &str) -> ConfigResult<OrchestratorConfig> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&OrchestratorConfig::default())?);

        let environment_stem = format!("{CONFIG_FILE_STEM}.{environment}");
        for stem in [CONFIG_FILE_STEM, environment_stem.as_str()] {
            for path in Self::config_files(directory, stem) {
                debug!(file = %path.display(), "Adding configuration file");
                builder = builder.add_source(config::File::from(path));
            }
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Existing `<stem>.<ext>` files for every supported format
    fn config_files(directory: &Path, stem: &str) -> Vec<PathBuf> {
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| directory.join(format!("{stem}.{ext}")))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Detect the active environment name
    pub fn detect_environment() -> String {
        env::var("ORCHESTRATOR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("ORCHESTRATOR_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}
