//! Application configuration.
//!
//! Aggregates store, batching and telemetry settings into a single Config
//! struct that can be loaded from YAML files or environment variables.

mod batch;
mod store;
mod table_names;
mod telemetry;

pub use batch::{BatchConfig, RetrySettings};
pub use store::StoreConfig;
pub use table_names::{upper_snake_case, TableNames, TABLE_ENV_PREFIX};
pub use telemetry::TelemetryConfig;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "dynaflush.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "DYNAFLUSH_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "DYNAFLUSH";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "DYNAFLUSH_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Table name not configured for entity {entity}: set {variable}")]
    MissingTableName { entity: String, variable: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Table store connection.
    pub store: StoreConfig,
    /// Write coalescing.
    pub batch: BatchConfig,
    /// Telemetry batching and sink credentials.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `dynaflush.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.batch.debounce_ms, 300);
        assert_eq!(config.batch.chunk_size, 25);
        assert!(config.batch.max_wait_ms.is_none());
        assert!(config.store.endpoint_url.is_none());
        assert!(!config.telemetry.has_credentials());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "store:\n  region: eu-west-1\nbatch:\n  debounce_ms: 50\n  max_wait_ms: 2000\n  retry:\n    max_retries: 3\ntelemetry:\n  service_name: booking"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.store.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.batch.debounce_ms, 50);
        assert_eq!(config.batch.max_wait_ms, Some(2000));
        assert_eq!(config.batch.retry.max_retries, 3);
        assert_eq!(config.batch.chunk_size, 25);
        assert_eq!(config.telemetry.service_name, "booking");
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        std::env::set_var("DYNAFLUSH__BATCH__DEBOUNCE_MS", "75");
        let config = Config::load(None);
        std::env::remove_var("DYNAFLUSH__BATCH__DEBOUNCE_MS");

        assert_eq!(config.unwrap().batch.debounce_ms, 75);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some("/nonexistent/dynaflush.yaml")).is_err());
    }
}
