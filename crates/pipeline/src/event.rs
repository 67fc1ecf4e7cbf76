//! Events driving a running daemon

use std::fmt;

/// Already-decoded request from outside the daemon
///
/// The process shell maps SIGHUP to `Rotate` and SIGINT / SIGTERM / SIGQUIT
/// to `Terminate`; tests send them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonEvent {
    /// Reopen the log file
    Rotate,
    /// Stop accepting, drain connections, close the log file
    Terminate,
}

impl fmt::Display for DaemonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rotate => f.write_str("rotate"),
            Self::Terminate => f.write_str("terminate"),
        }
    }
}
