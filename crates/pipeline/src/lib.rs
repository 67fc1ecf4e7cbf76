//! logd - Pipeline
//!
//! Connects the Unix source to the log writer and owns the shutdown order.
//!
//! # Architecture
//!
//! ```text
//! clients ──> [UnixSource] ──Message──> mpsc (bounded) ──> [LogWriter] ──> log.out
//!                  │                                            ^
//!             TaskTracker                                       │
//!                  │                                  Rotate / Quit
//!          [ShutdownCoordinator] <── DaemonEvent ── [Daemon] ───┘
//! ```
//!
//! # Key Design
//!
//! - **Pooled backpressure**: a fixed set of buffers caps messages in flight
//! - **One writer**: the file has exactly one owner, so rotation is race-free
//! - **Ordered shutdown**: stop accepting, drain handlers, then quit the writer

mod daemon;
mod error;
mod event;
mod shutdown;

pub use daemon::{Daemon, DaemonConfig, DaemonMonitor, DaemonReport};
pub use error::{PipelineError, Result};
pub use event::DaemonEvent;
pub use shutdown::{AcceptorTask, ShutdownCoordinator, WriterTask};
