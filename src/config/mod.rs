//! Configuration management for mongowire
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments (applied by the `cli` module)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::protocol::{ReadConcern, ReadConcernLevel};
use crate::transport::TransportConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Cursor retrieval configuration
    #[serde(default)]
    pub cursor: CursorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use TLS
    #[serde(default)]
    pub tls: bool,

    /// PEM file with trusted CA certificates
    #[serde(default)]
    pub tls_ca_file: Option<PathBuf>,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Socket read timeout in seconds (none waits forever)
    #[serde(default)]
    pub read_timeout: Option<u64>,
}

/// Cursor retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Documents requested per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,

    /// Server-side time limit per getMore in milliseconds
    #[serde(default)]
    pub max_time_ms: Option<i64>,

    /// Read concern level for reads
    #[serde(default)]
    pub read_concern: Option<ReadConcernLevel>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_timeout() -> u64 {
    30
}

fn default_batch_size() -> i32 {
    101
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: false,
            tls_ca_file: None,
            timeout: default_timeout(),
            read_timeout: None,
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_time_ms: None,
            read_concern: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration with proper precedence
    ///
    /// Reads `path` when given (it must exist), otherwise the default path
    /// when that file exists, otherwise defaults. Environment overrides are
    /// applied on top. Callers validate once their own overrides are in.
    ///
    /// # Returns
    /// * `Result<Config>` - Merged configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MONGOWIRE_*` overrides
    ///
    /// Recognized variables: `MONGOWIRE_HOST`, `MONGOWIRE_PORT`,
    /// `MONGOWIRE_TLS`, `MONGOWIRE_TLS_CA_FILE`, `MONGOWIRE_BATCH_SIZE`.
    ///
    /// # Arguments
    /// * `lookup` - Variable lookup, `std::env::var` outside of tests
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MONGOWIRE_HOST") {
            self.connection.host = host;
        }
        if let Some(port) = lookup("MONGOWIRE_PORT") {
            self.connection.port = parse_value("MONGOWIRE_PORT", &port)?;
        }
        if let Some(tls) = lookup("MONGOWIRE_TLS") {
            self.connection.tls = parse_value("MONGOWIRE_TLS", &tls)?;
        }
        if let Some(ca_file) = lookup("MONGOWIRE_TLS_CA_FILE") {
            self.connection.tls_ca_file = Some(PathBuf::from(ca_file));
        }
        if let Some(batch_size) = lookup("MONGOWIRE_BATCH_SIZE") {
            self.cursor.batch_size = parse_value("MONGOWIRE_BATCH_SIZE", &batch_size)?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongowire")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.connection.host.trim().is_empty() {
            return Err(invalid("connection.host", &self.connection.host));
        }
        if self.connection.port == 0 {
            return Err(invalid("connection.port", "0"));
        }
        if self.connection.tls && self.connection.tls_ca_file.is_none() {
            return Err(invalid("connection.tls_ca_file", "<unset>"));
        }
        if self.cursor.batch_size < 0 {
            return Err(invalid("cursor.batch_size", &self.cursor.batch_size.to_string()));
        }
        if let Some(max_time_ms) = self.cursor.max_time_ms {
            if max_time_ms < 0 {
                return Err(invalid("cursor.max_time_ms", &max_time_ms.to_string()));
            }
        }
        Ok(())
    }
}

impl ConnectionConfig {
    /// Transport options for this connection
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls,
            tls_ca_file: self.tls_ca_file.clone(),
            connect_timeout: Some(Duration::from_secs(self.timeout)).filter(|d| !d.is_zero()),
            read_timeout: self.read_timeout.map(Duration::from_secs),
        }
    }
}

impl CursorConfig {
    pub fn read_concern(&self) -> Option<ReadConcern> {
        self.read_concern.map(ReadConcern::new)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn parse_value<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(field, value))
}

fn invalid(field: &str, value: &str) -> crate::error::DriverError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 27017);
        assert_eq!(config.cursor.batch_size, 101);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [connection]
            host = "db.internal"
            tls = true
            tls_ca_file = "/etc/ssl/ca.pem"

            [cursor]
            max_time_ms = 1500
            read_concern = "majority"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 27017);
        assert!(config.connection.tls);
        assert_eq!(config.cursor.batch_size, 101);
        assert_eq!(config.cursor.max_time_ms, Some(1500));
        assert_eq!(config.cursor.read_concern(), Some(ReadConcern::majority()));
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml("[connection\nport = 1").is_err());
        assert!(Config::from_toml("[connection]\nport = \"high\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MONGOWIRE_HOST", "10.0.0.5"),
            ("MONGOWIRE_PORT", "27018"),
            ("MONGOWIRE_BATCH_SIZE", "20"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.connection.host, "10.0.0.5");
        assert_eq!(config.connection.port, 27018);
        assert_eq!(config.cursor.batch_size, 20);
    }

    #[test]
    fn test_env_override_invalid_port() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "MONGOWIRE_PORT").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MONGOWIRE_PORT"));
    }

    #[test]
    fn test_validate_tls_without_ca() {
        let mut config = Config::default();
        config.connection.tls = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transport_config() {
        let mut config = ConnectionConfig::default();
        config.read_timeout = Some(5);
        let transport = config.transport_config();
        assert!(!transport.tls);
        assert_eq!(transport.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(transport.read_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir()
            .join(format!("mongowire-config-{}.toml", std::process::id()));
        let content = "[cursor]\nmax_time_ms = 900\n\n[logging]\ntimestamps = false\n";
        std::fs::write(&path, content).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.cursor.max_time_ms, Some(900));
        assert!(!loaded.logging.timestamps);

        let _ = std::fs::remove_file(&path);
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, DriverError::Config(ConfigError::FileNotFound(_))));
    }
}
