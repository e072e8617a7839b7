//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order,
//! later ones winning: built-in defaults, `analytics.toml`,
//! `analytics.<env>.toml`, an optional explicit file, then `ANALYTICS__*`
//! environment variables (`ANALYTICS__DATABASE__POOL__MAX_CONNECTIONS=20`).

use super::AnalyticsConfig;
use crate::error::AnalyticsResult;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: AnalyticsConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> AnalyticsResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> AnalyticsResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> AnalyticsResult<Arc<ConfigManager>> {
        Self::load_with_file(config_dir, environment, None)
    }

    /// Load configuration, layering `explicit_file` above the directory files
    pub fn load_with_file(
        config_dir: Option<PathBuf>,
        environment: &str,
        explicit_file: Option<&Path>,
    ) -> AnalyticsResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build_config(&config_directory, environment, explicit_file)?;
        config.validate()?;

        let sanitized_config = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized_config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: AnalyticsConfig) -> AnalyticsResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Effective configuration with secrets masked, for diagnostics output
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn build_config(
        config_directory: &Path,
        environment: &str,
        explicit_file: Option<&Path>,
    ) -> AnalyticsResult<AnalyticsConfig> {
        let defaults = AnalyticsConfig {
            environment: environment.to_string(),
            ..AnalyticsConfig::default()
        };

        let mut builder = Config::builder()
            .add_source(Config::try_from(&defaults)?)
            .add_source(File::from(config_directory.join("analytics.toml")).required(false))
            .add_source(
                File::from(config_directory.join(format!("analytics.{environment}.toml")))
                    .required(false),
            );

        if let Some(path) = explicit_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("ANALYTICS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<AnalyticsConfig>()?;

        Ok(config)
    }

    /// Mask passwords, credentials and URLs that may embed them
    fn sanitize_config_for_logging(config: &AnalyticsConfig) -> serde_json::Value {
        let mut config_json = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
        let sensitive_patterns = ["password", "secret", "token", "credential", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = match val {
                            serde_json::Value::Null => serde_json::Value::Null,
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    /// ANALYTICS_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("ANALYTICS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("ANALYTICS_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}
