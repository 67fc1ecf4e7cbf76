//! logd Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid configuration - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use logd_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[sink]\npath = \"/var/log/app.log\"").unwrap();
//! assert_eq!(config.sink.path, "/var/log/app.log");
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [global]
//! buffer_capacity = 4096
//! pool_size = 64
//! queue_size = 1024
//! pid_file = "/run/logd.pid"
//!
//! [source]
//! socket_path = "/run/logd.sock"
//! read_timeout = "2s"
//!
//! [sink]
//! path = "/var/log/logd/log.out"
//! sync_every = 1000
//!
//! [log]
//! level = "info"
//! ```

mod error;
mod global;
mod logging;
mod sink;
mod source;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use global::GlobalConfig;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use sink::SinkConfig;
pub use source::SourceConfig;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global settings (buffer pool, queue, runtime, pid file)
    pub global: GlobalConfig,

    /// Logging configuration for the daemon's own diagnostics
    pub log: LogConfig,

    /// Listening socket
    pub source: SourceConfig,

    /// Output log file
    pub sink: SinkConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Called automatically when parsing; call again after applying command
    /// line overrides.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
