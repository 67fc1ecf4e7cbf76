//! Error types for the test client

use std::io;

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors talking to a logd socket
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not connect to the socket
    #[error("failed to connect to {path}: {source}")]
    Connect {
        /// Socket path
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// A write failed
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Shutting the stream down failed
    #[error("close failed: {0}")]
    Close(#[source] io::Error),
}

impl ClientError {
    /// The underlying IO error
    pub fn io_error(&self) -> &io::Error {
        match self {
            Self::Connect { source, .. } => source,
            Self::Send(e) | Self::Close(e) => e,
        }
    }

    /// Whether reconnecting and trying again may succeed
    ///
    /// Covers a daemon that is restarting (socket missing or refusing) and a
    /// connection dropped under load.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.io_error().kind(),
            io::ErrorKind::NotFound
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::TimedOut
        )
    }
}
