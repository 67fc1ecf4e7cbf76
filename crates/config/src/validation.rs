//! Configuration validation
//!
//! Validates config consistency:
//! - Pool, buffer and queue sizes are non-zero
//! - Socket and log paths are present and distinct
//! - Timeouts are non-zero

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_global(config)?;
    validate_source(config)?;
    validate_sink(config)?;

    if config.source.socket_path == config.sink.path {
        return Err(ConfigError::PathConflict {
            path: config.sink.path.clone(),
        });
    }

    Ok(())
}

fn validate_global(config: &Config) -> Result<()> {
    let global = &config.global;

    if global.buffer_capacity == 0 {
        return Err(ConfigError::invalid_value(
            "global",
            "buffer_capacity",
            "must be at least 1 byte",
        ));
    }
    if global.pool_size == 0 {
        return Err(ConfigError::invalid_value(
            "global",
            "pool_size",
            "must be at least 1",
        ));
    }
    if global.queue_size == 0 {
        return Err(ConfigError::invalid_value(
            "global",
            "queue_size",
            "must be at least 1",
        ));
    }
    if let Some(pid_file) = &global.pid_file
        && pid_file.is_empty()
    {
        return Err(ConfigError::invalid_value(
            "global",
            "pid_file",
            "must not be empty when set",
        ));
    }

    Ok(())
}

fn validate_source(config: &Config) -> Result<()> {
    let source = &config.source;

    if source.socket_path.is_empty() {
        return Err(ConfigError::missing_field("source", "socket_path"));
    }
    if source.read_timeout.is_zero() {
        return Err(ConfigError::invalid_value(
            "source",
            "read_timeout",
            "must be greater than zero",
        ));
    }
    if let Some(mode) = source.socket_mode
        && mode > 0o777
    {
        return Err(ConfigError::invalid_value(
            "source",
            "socket_mode",
            format!("{mode:#o} is not a permission mask"),
        ));
    }

    Ok(())
}

fn validate_sink(config: &Config) -> Result<()> {
    let sink = &config.sink;

    if sink.path.is_empty() {
        return Err(ConfigError::missing_field("sink", "path"));
    }
    if sink.flush_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "sink",
            "flush_interval",
            "must be greater than zero",
        ));
    }
    if sink.max_write_retries == 0 {
        return Err(ConfigError::invalid_value(
            "sink",
            "max_write_retries",
            "must be at least 1",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = Config::default();
        config.global.buffer_capacity = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.global.queue_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("queue_size"));
    }

    #[test]
    fn test_empty_paths_rejected() {
        let mut config = Config::default();
        config.source.socket_path.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField {
                field: "socket_path",
                ..
            })
        ));

        let mut config = Config::default();
        config.sink.path.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field: "path", .. })
        ));
    }

    #[test]
    fn test_same_socket_and_log_path_rejected() {
        let mut config = Config::default();
        config.sink.path = config.source.socket_path.clone();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::PathConflict { .. })
        ));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = Config::default();
        config.source.read_timeout = Duration::ZERO;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.sink.flush_interval = Duration::ZERO;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_socket_mode_range() {
        let mut config = Config::default();
        config.source.socket_mode = Some(0o660);
        assert!(validate_config(&config).is_ok());

        config.source.socket_mode = Some(0o10000);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_pid_file_rejected() {
        let mut config = Config::default();
        config.global.pid_file = Some(String::new());
        assert!(validate_config(&config).is_err());
    }
}
