//! Configuration module for the block exchange server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::directory::MAX_BLOCK_SIZE;
use crate::runtime::connection::{SessionConfig, MAX_BODY_SIZE, REQUEST_TIMEOUT};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the block exchange server
#[derive(Parser, Debug, Default)]
#[command(name = "block-exchange")]
#[command(version)]
#[command(about = "A content-addressed block exchange server over HTTP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Deadline for each read and write, in seconds
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Grace period for in-flight sessions at shutdown, in seconds
    #[arg(long)]
    pub shutdown_timeout: Option<u64>,

    /// Largest accepted request body in bytes
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Upper bound for generated block sizes in bytes
    #[arg(long)]
    pub max_block_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Read/write deadline in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Grace period for in-flight sessions at shutdown, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            request_timeout: default_request_timeout(),
            max_body_size: default_max_body_size(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Content directory configuration
#[derive(Debug, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_block_size: default_max_block_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const DEFAULT_LISTEN: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);

/// Default grace period for in-flight sessions at shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

fn default_listen() -> String {
    SocketAddr::from(DEFAULT_LISTEN).to_string()
}

fn default_request_timeout() -> u64 {
    REQUEST_TIMEOUT.as_secs()
}

fn default_shutdown_timeout() -> u64 {
    SHUTDOWN_TIMEOUT.as_secs()
}

fn default_max_body_size() -> usize {
    MAX_BODY_SIZE
}

fn default_max_block_size() -> usize {
    MAX_BLOCK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub workers: Option<usize>,
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub shutdown_timeout: Duration,
    pub max_block_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: DEFAULT_LISTEN.into(),
            workers: None,
            request_timeout: REQUEST_TIMEOUT,
            max_body_size: MAX_BODY_SIZE,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            max_block_size: MAX_BLOCK_SIZE,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents)
                .map_err(|source| ConfigError::TomlParse {
                    path: config_path.clone(),
                    source,
                })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen = listen
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidListen(listen))?;

        Ok(Config {
            listen,
            workers: cli.workers.or(toml_config.server.workers),
            request_timeout: Duration::from_secs(
                cli.request_timeout
                    .unwrap_or(toml_config.server.request_timeout),
            ),
            max_body_size: cli
                .max_body_size
                .unwrap_or(toml_config.server.max_body_size),
            shutdown_timeout: Duration::from_secs(
                cli.shutdown_timeout
                    .unwrap_or(toml_config.server.shutdown_timeout),
            ),
            max_block_size: cli
                .max_block_size
                .unwrap_or(toml_config.directory.max_block_size),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            timeout: self.request_timeout,
            max_body_size: self.max_body_size,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid listen address '{0}', expected <ip>:<port>")]
    InvalidListen(String),
}
