//! Protocol error types

use thiserror::Error;

/// Errors returned by the buffer pool
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferPoolError {
    /// The pool's semaphore was closed
    #[error("buffer pool closed")]
    Closed,

    /// A permit was granted but no buffer was queued
    #[error("buffer pool accounting is inconsistent")]
    Inconsistent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(BufferPoolError::Closed.to_string(), "buffer pool closed");
        assert!(BufferPoolError::Inconsistent.to_string().contains("inconsistent"));
    }
}
