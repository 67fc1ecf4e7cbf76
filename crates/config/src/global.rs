//! Global configuration settings
//!
//! Buffer pool and queue sizing, runtime threads, pid file.

use logd_protocol::{DEFAULT_BUFFER_CAPACITY, DEFAULT_POOL_SIZE, DEFAULT_QUEUE_SIZE};
use serde::Deserialize;

/// Global configuration that applies to the whole daemon
///
/// All fields have sensible defaults - you only need to specify what you want to change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Capacity of each pooled read buffer (bytes); also the largest message
    /// Default: 4096
    pub buffer_capacity: usize,

    /// Number of pooled read buffers (maximum messages in flight)
    /// Default: 64
    pub pool_size: usize,

    /// Capacity of the handler -> writer message queue
    /// Default: 1024
    pub queue_size: usize,

    /// Number of worker threads for the async runtime
    /// Default: None (number of CPU cores)
    pub worker_threads: Option<usize>,

    /// Write the daemon's pid here at startup, removed at exit
    /// Default: None
    pub pid_file: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            pool_size: DEFAULT_POOL_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
            worker_threads: None,
            pid_file: None,
        }
    }
}

impl GlobalConfig {
    /// Get the effective number of runtime worker threads
    ///
    /// Returns the configured value, or the CPU count if not set.
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus).max(1)
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
