//! Sink configuration
//!
//! The append-only output file and how it is buffered and synced.

use serde::Deserialize;
use std::time::Duration;

/// Output log file configuration
///
/// # Example
///
/// ```toml
/// [sink]
/// path = "/var/log/logd/log.out"
/// write_buffer_size = 65536
/// flush_interval = "100ms"
/// sync_every = 1000
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Log file path, opened for append and created if missing
    /// Default: "log.out"
    pub path: String,

    /// In-memory write buffer in front of the file (bytes)
    /// Default: 65536
    pub write_buffer_size: usize,

    /// Flush the write buffer at least this often
    /// Default: 100ms
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// fsync after every N messages (0 = only on rotate and shutdown)
    /// Default: 0
    pub sync_every: u64,

    /// Attempts per message before a write is counted as failed
    /// Default: 3
    pub max_write_retries: usize,

    /// Delay between write attempts
    /// Default: 10ms
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: "log.out".into(),
            write_buffer_size: 64 * 1024,
            flush_interval: Duration::from_millis(100),
            sync_every: 0,
            max_write_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }
}
