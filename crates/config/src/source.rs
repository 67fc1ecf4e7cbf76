//! Source configuration
//!
//! The Unix socket clients connect to.

use serde::Deserialize;
use std::time::Duration;

/// Unix socket source configuration
///
/// # Example
///
/// ```toml
/// [source]
/// socket_path = "/run/logd.sock"
/// read_timeout = "2s"
/// socket_mode = 0o660
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Filesystem path of the listening socket; a stale file is replaced
    /// Default: "logd.sock"
    pub socket_path: String,

    /// Per-read timeout; also bounds how long an idle client delays shutdown
    /// Default: 2s
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Permission bits applied to the socket file after binding
    /// Default: None (process umask applies)
    pub socket_mode: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            socket_path: "logd.sock".into(),
            read_timeout: Duration::from_secs(2),
            socket_mode: None,
        }
    }
}
