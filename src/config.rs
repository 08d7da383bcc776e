//! Configuration module for the bulletin board server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the board server
#[derive(Parser, Debug)]
#[command(name = "bulletin")]
#[command(author = "bulletin authors")]
#[command(version)]
#[command(about = "A telnet-style bulletin board server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host address to bind to (e.g., 0.0.0.0)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Enable debug output for connection duties
    #[arg(short, long)]
    pub debug: bool,

    /// Maximum number of stored messages
    #[arg(long)]
    pub max_messages: Option<usize>,

    /// Maximum messages returned by the read command
    #[arg(long)]
    pub max_read_messages: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to the MOTD template file
    pub motd_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            motd_file: None,
        }
    }
}

/// Board storage configuration
#[derive(Debug, Deserialize)]
pub struct BoardConfig {
    /// Maximum number of stored messages
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Maximum messages returned by the read command
    #[serde(default = "default_max_read_messages")]
    pub max_read_messages: usize,
    /// Path to the message log file
    pub messages_file: Option<PathBuf>,
    /// Path to the user database file
    pub users_file: Option<PathBuf>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_read_messages: default_max_read_messages(),
            messages_file: None,
            users_file: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable debug output for connection duties
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            debug: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2323
}

fn default_max_messages() -> usize {
    1_000_000
}

fn default_max_read_messages() -> usize {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub max_messages: usize,
    pub max_read_messages: usize,
    pub motd_file: Option<PathBuf>,
    pub messages_file: Option<PathBuf>,
    pub users_file: Option<PathBuf>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            debug: cli.debug || toml_config.logging.debug,
            max_messages: cli
                .max_messages
                .unwrap_or(toml_config.board.max_messages),
            max_read_messages: cli
                .max_read_messages
                .unwrap_or(toml_config.board.max_read_messages),
            motd_file: toml_config.server.motd_file,
            messages_file: toml_config.board.messages_file,
            users_file: toml_config.board.users_file,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Listen address in `host:port` form.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            debug: false,
            max_messages: default_max_messages(),
            max_read_messages: default_max_read_messages(),
            motd_file: None,
            messages_file: None,
            users_file: None,
            log_level: default_log_level(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
