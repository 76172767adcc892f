//! Configuration Loader
//!
//! Environment-aware loading: defaults, base YAML file, environment YAML
//! file, then `FORM__` environment variables, merged by the `config` crate.

use ::config::{Config, Environment, File, Map};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::FormCoordinatorConfig;
use crate::constants::system::{CONFIG_FILE_STEM, ENV_PREFIX};

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: FormCoordinatorConfig,
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
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layers(config_dir, environment, None)
    }

    /// Same as [`Self::load_from_directory_with_env`] but reads variable
    /// overrides from `overrides` instead of the process environment.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Map<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layers(config_dir, environment, Some(overrides))
    }

    fn load_layers(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let defaults = Config::try_from(&FormCoordinatorConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let base_file = config_directory.join(format!("{CONFIG_FILE_STEM}.yaml"));
        let env_file = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.yaml"));

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(overrides),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let config: FormCoordinatorConfig = merged
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string_pretty(&config.sanitized())
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = environment,
            request_queue = %config.rabbitmq.request_queue,
            output_exchange = %config.rabbitmq.output_exchange,
            retry_attempts = config.retry.attempts,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: FormCoordinatorConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &FormCoordinatorConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: FORM_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("FORM_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Nearest `config/` directory holding the base file, walking up from the
    /// working directory; `./config` otherwise
    fn default_config_directory() -> PathBuf {
        let base_name = format!("{CONFIG_FILE_STEM}.yaml");

        if let Ok(mut current) = env::current_dir() {
            loop {
                let candidate = current.join("config");
                if candidate.join(&base_name).exists() {
                    debug!("Found config directory: {}", candidate.display());
                    return candidate;
                }
                if !current.pop() {
                    break;
                }
            }
        }

        PathBuf::from("config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", Map::new())
                .unwrap();

        assert_eq!(manager.config(), &FormCoordinatorConfig::default());
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config_directory(), dir.path());
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "form-coordinator.yaml",
            "rabbitmq:\n  request_queue: base_queue\nretry:\n  attempts: 4\n",
        );
        write(
            dir.path(),
            "form-coordinator.production.yaml",
            "rabbitmq:\n  request_queue: prod_queue\n",
        );

        let manager = ConfigManager::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "production",
            Map::new(),
        )
        .unwrap();

        assert_eq!(manager.config().rabbitmq.request_queue, "prod_queue");
        assert_eq!(manager.config().retry.attempts, 4);
        // untouched keys keep their defaults
        assert_eq!(manager.config().rabbitmq.output_exchange, "form.events");
    }

    #[test]
    fn test_variables_override_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "form-coordinator.yaml", "retry:\n  attempts: 4\n");

        let mut overrides = Map::new();
        overrides.insert("FORM__RETRY__ATTEMPTS".to_string(), "7".to_string());
        overrides.insert(
            "FORM__REDIS__URL".to_string(),
            "redis://cache.internal:6379".to_string(),
        );

        let manager =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", overrides)
                .unwrap();

        assert_eq!(manager.config().retry.attempts, 7);
        assert_eq!(manager.config().redis.url, "redis://cache.internal:6379");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "form-coordinator.yaml", "retry:\n  attempts: 0\n");

        let err = ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", Map::new())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "form-coordinator.yaml", "retry: [unterminated\n");

        let err = ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", Map::new())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::LoadError { .. }));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = FormCoordinatorConfig::default();
        config.retry.attempts = 0;
        assert!(ConfigManager::from_config(config, "test").is_err());
    }
}
