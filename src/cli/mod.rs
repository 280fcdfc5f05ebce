//! Command-line interface for mongowire
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Namespace and filter parsing for the query to run

use clap::Parser;
use std::path::{Path, PathBuf};

use bson::{Bson, Document};

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::protocol::Namespace;

/// Stream a collection's documents through a server-side cursor
#[derive(Parser, Debug)]
#[command(
    name = "mongowire",
    version,
    about = "Read a MongoDB collection through a server-side cursor",
    long_about = "Runs a find against <database>.<collection>, pulls every batch through \
getMore and prints each document as relaxed extended JSON, one per line."
)]
pub struct CliArgs {
    /// Namespace to read, as <database>.<collection>
    #[arg(value_name = "NAMESPACE")]
    pub namespace: String,

    /// Server to connect to
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to connect to
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Query filter as JSON
    #[arg(short = 'f', long, value_name = "JSON")]
    pub filter: Option<String>,

    /// Documents requested per batch
    #[arg(short = 'b', long, value_name = "N")]
    pub batch_size: Option<i32>,

    /// Server-side time limit per getMore, in milliseconds
    #[arg(long, value_name = "MS")]
    pub max_time_ms: Option<i64>,

    /// Stop after this many documents
    #[arg(short = 'n', long, value_name = "N")]
    pub limit: Option<u64>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Enable TLS
    #[arg(long)]
    pub tls: bool,

    /// TLS CA certificate file
    #[arg(long, value_name = "FILE")]
    pub tls_ca_file: Option<PathBuf>,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, &args);
        config.validate()?;

        Ok(Self { args, config })
    }

    /// Get the configuration
    ///
    /// # Returns
    /// * `&Config` - Reference to configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    ///
    /// # Returns
    /// * `&CliArgs` - Reference to arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Explicit configuration file, if one was given
    pub fn config_path(&self) -> Option<&Path> {
        self.args.config_file.as_deref()
    }

    /// Parse the namespace argument
    pub fn namespace(&self) -> Result<Namespace> {
        self.args.namespace.parse()
    }

    /// Parse the `--filter` argument, an empty filter when absent
    ///
    /// # Returns
    /// * `Result<Document>` - Filter document or error
    pub fn filter(&self) -> Result<Document> {
        match &self.args.filter {
            Some(json) => parse_filter(json),
            None => Ok(Document::new()),
        }
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);
        Self::apply_connection_args(config, args);
        Self::apply_cursor_args(config, args);
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else {
            config.logging.level
        };
    }

    /// Apply connection-related CLI arguments to configuration
    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(host) = &args.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = args.port {
            config.connection.port = port;
        }
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
        if args.tls {
            config.connection.tls = true;
        }
        if let Some(ca_file) = &args.tls_ca_file {
            config.connection.tls_ca_file = Some(ca_file.clone());
        }
    }

    /// Apply cursor-related CLI arguments to configuration
    fn apply_cursor_args(config: &mut Config, args: &CliArgs) {
        if let Some(batch_size) = args.batch_size {
            config.cursor.batch_size = batch_size;
        }
        if let Some(max_time_ms) = args.max_time_ms {
            config.cursor.max_time_ms = Some(max_time_ms);
        }
    }
}

/// Parse a JSON (extended JSON accepted) filter into a document
fn parse_filter(json: &str) -> Result<Document> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: "filter".to_string(),
        value: reason,
    };

    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
    match Bson::try_from(value).map_err(|e| invalid(e.to_string()))? {
        Bson::Document(filter) => Ok(filter),
        other => Err(invalid(format!("expected an object, got {other}")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface(argv: &[&str]) -> CliInterface {
        let args = CliArgs::try_parse_from(argv).unwrap();
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);
        CliInterface { args, config }
    }

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::try_parse_from(vec!["mongowire", "shop.orders"]).unwrap();
        assert_eq!(args.namespace, "shop.orders");
        assert!(args.filter.is_none());
        assert!(!args.tls);
    }

    #[test]
    fn test_cli_args_require_namespace() {
        assert!(CliArgs::try_parse_from(vec!["mongowire"]).is_err());
    }

    #[test]
    fn test_cli_args_with_flags() {
        let args = CliArgs::try_parse_from(vec![
            "mongowire",
            "shop.orders",
            "--batch-size",
            "50",
            "--max-time-ms",
            "2000",
            "-n",
            "10",
            "--vv",
        ])
        .unwrap();
        assert_eq!(args.batch_size, Some(50));
        assert_eq!(args.max_time_ms, Some(2000));
        assert_eq!(args.limit, Some(10));
        assert!(args.very_verbose);
    }

    #[test]
    fn test_args_override_config() {
        let cli = interface(&[
            "mongowire",
            "shop.orders",
            "--host",
            "db.internal",
            "--port",
            "27018",
            "--tls",
            "--tls-ca-file",
            "/etc/ssl/ca.pem",
            "-b",
            "7",
            "-v",
        ]);
        let config = cli.config();
        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 27018);
        assert!(config.connection.tls);
        assert_eq!(
            config.connection.tls_ca_file.as_deref(),
            Some(Path::new("/etc/ssl/ca.pem"))
        );
        assert_eq!(config.cursor.batch_size, 7);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_namespace() {
        let cli = interface(&["mongowire", "shop.orders.archive"]);
        let namespace = cli.namespace().unwrap();
        assert_eq!(namespace.database(), "shop");
        assert_eq!(namespace.collection(), "orders.archive");

        assert!(interface(&["mongowire", "orders"]).namespace().is_err());
    }

    #[test]
    fn test_filter() {
        let cli = interface(&["mongowire", "shop.orders"]);
        assert_eq!(cli.filter().unwrap(), Document::new());

        let cli = interface(&[
            "mongowire",
            "shop.orders",
            "--filter",
            r#"{"status": "open", "total": {"$gt": 10}}"#,
        ]);
        let filter = cli.filter().unwrap();
        assert_eq!(filter.get_str("status").unwrap(), "open");
        assert!(filter.get_document("total").unwrap().contains_key("$gt"));
    }

    #[test]
    fn test_filter_rejects_non_object() {
        assert!(parse_filter("[1, 2]").is_err());
        assert!(parse_filter("{status").is_err());
    }
}
