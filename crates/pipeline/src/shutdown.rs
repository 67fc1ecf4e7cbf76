//! Shutdown sequencing
//!
//! ```text
//! cancel token ──> acceptor stops, socket removed
//!      │
//! tracker.close() + wait() ──> every handler has exited
//!      │                        (idle clients: at most one read timeout)
//! Quit ──> writer writes what is queued, flushes, syncs, closes
//!      │
//! join writer ──> final metrics or the writer's error
//! ```
//!
//! Handlers are never interrupted mid-read; they notice the cancellation at
//! the top of their loop. The writer keeps running through [`drain`], so the
//! caller may still deliver rotations until it calls [`finish`].
//!
//! [`drain`]: ShutdownCoordinator::drain
//! [`finish`]: ShutdownCoordinator::finish

use logd_sinks::{LogWriterError, LogWriterHandle, WriterMetricsSnapshot};
use logd_sources::UnixSourceError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::Result;

/// Join handle of the accept loop
pub type AcceptorTask = JoinHandle<std::result::Result<(), UnixSourceError>>;

/// Join handle of the log writer
pub type WriterTask = JoinHandle<std::result::Result<WriterMetricsSnapshot, LogWriterError>>;

/// Runs the stop / drain / quit sequence
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    tracker: TaskTracker,
    writer: LogWriterHandle,
}

impl ShutdownCoordinator {
    pub fn new(cancel: CancellationToken, tracker: TaskTracker, writer: LogWriterHandle) -> Self {
        Self {
            cancel,
            tracker,
            writer,
        }
    }

    /// Stop accepting and wait until every connection handler has exited
    ///
    /// Waiting for the acceptor first guarantees no handler is spawned after
    /// the tracker is closed.
    pub async fn drain(&self, acceptor: Option<AcceptorTask>) {
        self.cancel.cancel();

        if let Some(acceptor) = acceptor {
            match acceptor.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "acceptor stopped with error"),
                Err(e) => tracing::error!(error = %e, "acceptor task failed"),
            }
        }

        let active = self.tracker.len();
        if active > 0 {
            tracing::info!(connections = active, "waiting for connections to drain");
        }

        self.tracker.close();
        self.tracker.wait().await;

        tracing::debug!("all connections drained");
    }

    /// Send `Quit` once and collect the writer's result
    ///
    /// Call after [`drain`](Self::drain) so no handler is left to enqueue.
    pub async fn finish(&self, writer_task: WriterTask) -> Result<WriterMetricsSnapshot> {
        if let Err(e) = self.writer.quit().await {
            // Already gone; its result is still in the join handle.
            tracing::debug!(error = %e, "writer stopped before quit");
        }

        let snapshot = writer_task.await??;
        self.writer.wait_terminated().await;

        Ok(snapshot)
    }
}
