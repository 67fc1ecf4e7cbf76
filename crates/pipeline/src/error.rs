//! Pipeline error types

use thiserror::Error;

use logd_sinks::LogWriterError;
use logd_sources::UnixSourceError;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Sizing that cannot produce a working daemon
    #[error("invalid daemon config: {0}")]
    InvalidConfig(String),

    /// Listener setup failed
    #[error(transparent)]
    Source(#[from] UnixSourceError),

    /// The log writer failed to open or rotate its file
    #[error(transparent)]
    Writer(#[from] LogWriterError),

    /// The writer task panicked or was aborted
    #[error("log writer task failed: {0}")]
    WriterTask(#[from] tokio::task::JoinError),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
