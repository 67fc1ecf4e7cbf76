//! Sink utilities
//!
//! - **log_file**: buffered append-only file with per-line writes
//! - **rate_limited_logger**: error logging that stays quiet under sustained failure

pub mod log_file;
pub mod rate_limited_logger;

pub use log_file::{LOG_FILE_MODE, LogFile};
pub use rate_limited_logger::{DEFAULT_LOG_INTERVAL, MAX_DATA_LOG_LENGTH, RateLimitedLogger};
