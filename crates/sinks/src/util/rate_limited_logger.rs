//! Rate-limited error logging utility
//!
//! Prevents log spam under heavy error conditions (e.g. a full disk) by
//! logging at most once per interval, with a count of what was suppressed.
//!
//! # Example
//!
//! ```ignore
//! use logd_sinks::util::RateLimitedLogger;
//! use std::time::Duration;
//!
//! let logger = RateLimitedLogger::new(Duration::from_secs(10));
//!
//! // Only logs once per 10 seconds, even if called frequently
//! for _ in 0..1000 {
//!     logger.error("write failed", &io_error);
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval for rate-limited logging
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum message prefix included in log output
pub const MAX_DATA_LOG_LENGTH: usize = 256;

/// Rate-limited logger that prevents log spam
///
/// Thread-safe: uses atomic counters and a mutex for the last log time.
pub struct RateLimitedLogger {
    /// Minimum interval between log messages
    min_interval: Duration,

    /// Last time we logged
    last_log_time: Mutex<Option<Instant>>,

    /// Count of errors since last log
    error_count: AtomicU64,

    /// Total errors ever recorded
    total_errors: AtomicU64,
}

impl RateLimitedLogger {
    /// Create a new rate-limited logger with the specified interval
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            error_count: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    /// Record an error and log if enough time has passed
    ///
    /// Returns true if the error was logged, false if it was suppressed.
    pub fn error(&self, message: &str, error: &dyn std::fmt::Display) -> bool {
        if !self.record() {
            return false;
        }

        let (suppressed, total) = self.take_counts();
        tracing::error!(
            message = %message,
            error = %error,
            suppressed_count = suppressed,
            total_errors = total,
            "error (rate-limited)"
        );
        true
    }

    /// Record an error about a message, logging a truncated prefix of it
    pub fn error_with_data(
        &self,
        message: &str,
        error: &dyn std::fmt::Display,
        data: &[u8],
    ) -> bool {
        if !self.record() {
            return false;
        }

        let preview = if data.len() > MAX_DATA_LOG_LENGTH {
            format!(
                "{}... (truncated from {} bytes)",
                String::from_utf8_lossy(&data[..MAX_DATA_LOG_LENGTH]),
                data.len()
            )
        } else {
            String::from_utf8_lossy(data).into_owned()
        };

        let (suppressed, total) = self.take_counts();
        tracing::error!(
            message = %message,
            error = %error,
            data = %preview,
            suppressed_count = suppressed,
            total_errors = total,
            "error with data (rate-limited)"
        );
        true
    }

    /// Count the error; true when the interval has elapsed
    fn record(&self) -> bool {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);

        let mut last_time = self.last_log_time.lock();
        let now = Instant::now();

        match *last_time {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                *last_time = Some(now);
                true
            }
        }
    }

    fn take_counts(&self) -> (u64, u64) {
        let count = self.error_count.swap(0, Ordering::Relaxed);
        (
            count.saturating_sub(1),
            self.total_errors.load(Ordering::Relaxed),
        )
    }

    /// Get the current error count since last log
    pub fn pending_error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Get the total error count
    pub fn total_error_count(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_rate_limited_logger_default() {
        let logger = RateLimitedLogger::default();
        assert_eq!(logger.min_interval, DEFAULT_LOG_INTERVAL);
        assert_eq!(logger.total_error_count(), 0);
    }

    #[test]
    fn test_first_error_always_logs() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = io::Error::other("disk full");

        assert!(logger.error("write failed", &error));
        assert_eq!(logger.total_error_count(), 1);
        assert_eq!(logger.pending_error_count(), 0);
    }

    #[test]
    fn test_rapid_errors_suppressed() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let error = io::Error::other("disk full");

        assert!(logger.error("write failed", &error));
        for _ in 0..10 {
            assert!(!logger.error("write failed", &error));
        }

        assert_eq!(logger.total_error_count(), 11);
        assert_eq!(logger.pending_error_count(), 10);
    }

    #[test]
    fn test_logs_again_after_interval() {
        let logger = RateLimitedLogger::new(Duration::from_millis(1));
        let error = io::Error::other("disk full");

        assert!(logger.error("write failed", &error));
        std::thread::sleep(Duration::from_millis(5));
        assert!(logger.error_with_data("write failed", &error, &[b'x'; 1000]));
        assert_eq!(logger.total_error_count(), 2);
    }
}
