//! logd Protocol - core types shared between sources and sinks
//!
//! This crate provides the values that flow through the daemon:
//! - `BufferPool` - bounded pool of fixed-capacity read buffers
//! - `Message` - one client read, owning its pooled buffer
//! - `ControlCommand` - `Rotate` / `Quit` instructions for the log writer
//! - `WriterEvent` - either of the above, as queued for the writer
//!
//! # Design Principles
//!
//! - **Ownership transfer, no copies**: a buffer moves pool -> handler ->
//!   writer -> pool; the bytes are never duplicated
//! - **Bounded memory**: the pool never allocates past its configured size,
//!   exhaustion is resolved by waiting

mod buffer_pool;
mod error;
mod message;

pub use buffer_pool::{BufferPool, BufferPoolMetrics, PoolMetricsSnapshot};
pub use error::BufferPoolError;
pub use message::{ControlCommand, Message, WriterEvent};

// Re-export bytes for convenience
pub use bytes::BytesMut;

/// Default capacity of a pooled buffer in bytes (the largest single message)
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Default number of pooled buffers
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default capacity of the handler -> writer message queue
pub const DEFAULT_QUEUE_SIZE: usize = 1024;
