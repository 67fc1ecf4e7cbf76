//! logd - Sources
//!
//! Accept local clients and turn what they write into [`Message`]s for the
//! log writer.
//!
//! # Design Principles
//!
//! - **Pooled buffers**: every read borrows a `BytesMut` from the shared
//!   `BufferPool`; the pool size caps messages in flight
//! - **Per-connection tasks**: each client gets its own handler, registered in
//!   a `TaskTracker` before it runs so shutdown can wait for all of them
//! - **Cooperative stop**: a `CancellationToken` ends accepting immediately and
//!   handlers at their next loop iteration, once they have forwarded what
//!   their client already wrote
//!
//! [`Message`]: logd_protocol::Message

pub mod unix;

mod common;

pub use common::{MetricsSnapshot, SourceMetrics};
pub use unix::{UnixSource, UnixSourceConfig, UnixSourceError};
