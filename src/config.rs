//! Layered configuration
//!
//! Values are resolved in order: built-in defaults, an optional TOML file,
//! `DATABASE_*` environment variables for the warehouse connection, then
//! whatever the caller sets on top (CLI flags).
//!
//! ```toml
//! [warehouse]
//! host = "localhost"
//! port = 5432
//!
//! [pipeline]
//! data_dir = "ecommerce_data"
//! chunk_size = 5000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::pipeline::PipelineConfig;

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// An environment variable holds an unusable value
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Parse { .. } => {
                format!("{self}\n\nHint: Check your configuration file syntax.")
            }
            _ => self.to_string(),
        }
    }
}

/// Warehouse connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    /// Database name
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Maximum pooled connections
    pub pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            host: "postgres".to_string(),
            port: 5432,
            name: "ecommerce".to_string(),
            user: "admin".to_string(),
            password: "password".to_string(),
            pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Apply `DATABASE_*` overrides from the process environment
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `DATABASE_*` overrides from a lookup function
    pub fn apply_env_with<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DATABASE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("DATABASE_PORT") {
            self.port = parse_env("DATABASE_PORT", &port)?;
        }
        if let Some(name) = lookup("DATABASE_NAME") {
            self.name = name;
        }
        if let Some(user) = lookup("DATABASE_USER") {
            self.user = user;
        }
        if let Some(password) = lookup("DATABASE_PASSWORD") {
            self.password = password;
        }
        if let Some(size) = lookup("DATABASE_POOL_SIZE") {
            self.pool_size = parse_env("DATABASE_POOL_SIZE", &size)?;
            if self.pool_size == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "DATABASE_POOL_SIZE".to_string(),
                    value: size,
                });
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str, path: &Path) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read a TOML config file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&text, path)
    }

    /// Defaults, then the optional file, then the environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.warehouse.apply_env()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = WarehouseConfig::default();
        assert_eq!(config.host, "postgres");
        assert_eq!(config.port, 5432);
        assert_eq!(config.name, "ecommerce");
        assert_eq!(config.user, "admin");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_HOST", "db.internal"),
            ("DATABASE_PORT", "6543"),
            ("DATABASE_POOL_SIZE", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = WarehouseConfig::default();
        config
            .apply_env_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.user, "admin");
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = WarehouseConfig::default();
        let err = config
            .apply_env_with(|key| (key == "DATABASE_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DATABASE_PORT"));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[warehouse]\nhost = \"localhost\"\n\n[pipeline]\nchunk_size = 500\ndry_run = true"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.warehouse.host, "localhost");
        assert_eq!(config.warehouse.port, 5432);
        assert_eq!(config.pipeline.chunk_size, 500);
        assert!(config.pipeline.dry_run);
        assert_eq!(config.pipeline.view_name, "product_sales_summary");
    }

    #[test]
    fn test_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[warehouse\nhost = ").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.user_message().contains("Hint:"));
    }
}
