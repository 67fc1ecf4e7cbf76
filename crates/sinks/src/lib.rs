//! logd - Sinks
//!
//! The log writer: the one task that owns the output file.
//!
//! # Architecture
//!
//! ```text
//! [Handlers] --Message--------+
//!                              +--> [bounded queue] --> [LogWriter] --> log.out
//! [Daemon] --ControlCommand----+
//! ```
//!
//! Both kinds of entry share the queue, so a command is handled after every
//! message queued ahead of it and before every message queued behind it.
//!
//! Buffers travel inside messages and go back to the shared pool once their
//! line has been written.
//!
//! # Example
//!
//! ```ignore
//! use logd_sinks::log_writer::{LogWriter, LogWriterConfig};
//!
//! let (writer, handle) = LogWriter::open(LogWriterConfig::new("log.out"), pool)?;
//! let producer = handle.sender();
//! let task = tokio::spawn(writer.run());
//!
//! handle.rotate().await?;
//! handle.quit().await?;
//! let metrics = task.await??;
//! ```

/// Log writer - single consumer with rotate / quit control
pub mod log_writer;

/// Shared utilities (log file, rate-limited logging)
pub mod util;

pub use log_writer::{
    LogWriter, LogWriterConfig, LogWriterError, LogWriterHandle, LogWriterMetrics, WriterMetricsSnapshot,
    WriterState,
};
