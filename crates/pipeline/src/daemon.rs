//! Daemon wiring
//!
//! Builds the buffer pool, the log writer with its queue and the Unix source,
//! then turns a stream of [`DaemonEvent`]s into writer commands and, finally,
//! a shutdown.
//!
//! Rotations keep being honored while connections drain after `Terminate`;
//! only once every handler has exited does the writer get `Quit`.
//!
//! # Example
//!
//! ```ignore
//! use logd_pipeline::{Daemon, DaemonConfig, DaemonEvent};
//! use tokio::sync::mpsc;
//!
//! let daemon = Daemon::start(DaemonConfig::new("logd.sock", "log.out"))?;
//! let (events_tx, events_rx) = mpsc::channel(8);
//!
//! // elsewhere: events_tx.send(DaemonEvent::Rotate).await
//! let report = daemon.run(events_rx).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use logd_protocol::{BufferPool, DEFAULT_BUFFER_CAPACITY, DEFAULT_POOL_SIZE, PoolMetricsSnapshot};
use logd_sinks::{
    LogWriter, LogWriterConfig, LogWriterHandle, WriterMetricsSnapshot, WriterState,
};
use logd_sources::{MetricsSnapshot, SourceMetrics, UnixSource, UnixSourceConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::event::DaemonEvent;
use crate::shutdown::{AcceptorTask, ShutdownCoordinator, WriterTask};

/// Everything needed to start a daemon
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Bytes per pooled buffer; also the largest single message
    pub buffer_capacity: usize,

    /// Number of pooled buffers
    pub pool_size: usize,

    /// Listening socket
    pub source: UnixSourceConfig,

    /// Log file
    pub writer: LogWriterConfig,
}

impl DaemonConfig {
    /// Defaults for everything but the two paths
    pub fn new(socket_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            pool_size: DEFAULT_POOL_SIZE,
            source: UnixSourceConfig::new(socket_path),
            writer: LogWriterConfig::new(log_path),
        }
    }

    /// Set the pool size and per-buffer capacity
    pub fn with_pool(mut self, pool_size: usize, buffer_capacity: usize) -> Self {
        self.pool_size = pool_size;
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Set the writer queue capacity
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.writer.queue_size = queue_size;
        self
    }

    fn check(&self) -> Result<()> {
        for (name, value) in [
            ("buffer_capacity", self.buffer_capacity),
            ("pool_size", self.pool_size),
            ("queue_size", self.writer.queue_size),
        ] {
            if value == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// Final metrics of a daemon run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonReport {
    pub source: MetricsSnapshot,
    pub writer: WriterMetricsSnapshot,
    pub pool: PoolMetricsSnapshot,
    pub rotations_requested: u64,
}

/// Read-only view of a running daemon's counters
#[derive(Clone)]
pub struct DaemonMonitor {
    pool: Arc<BufferPool>,
    source_metrics: Arc<SourceMetrics>,
    writer: LogWriterHandle,
}

impl DaemonMonitor {
    /// Source metrics
    pub fn source(&self) -> MetricsSnapshot {
        self.source_metrics.snapshot()
    }

    /// Writer metrics
    pub fn writer(&self) -> WriterMetricsSnapshot {
        self.writer.metrics()
    }

    /// Buffer pool metrics
    pub fn pool(&self) -> PoolMetricsSnapshot {
        self.pool.metrics().snapshot()
    }

    /// Buffers currently held by handlers, the queue or the writer
    pub fn buffers_in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Writer lifecycle state
    pub fn writer_state(&self) -> WriterState {
        self.writer.state()
    }
}

/// A started daemon: writer and acceptor running
pub struct Daemon {
    socket_path: PathBuf,
    log_path: PathBuf,
    pool: Arc<BufferPool>,
    source_metrics: Arc<SourceMetrics>,
    writer: LogWriterHandle,
    writer_task: WriterTask,
    acceptor: AcceptorTask,
    coordinator: ShutdownCoordinator,
}

impl Daemon {
    /// Open the log file, bind the socket and spawn the writer and acceptor
    ///
    /// Must be called from within a tokio runtime. Failing to open the log
    /// file or to bind the socket is fatal.
    pub fn start(config: DaemonConfig) -> Result<Self> {
        config.check()?;

        let pool = Arc::new(BufferPool::new(config.pool_size, config.buffer_capacity));

        let log_path = config.writer.path.clone();
        let socket_path = config.source.socket_path.clone();
        let queue_size = config.writer.queue_size;

        let (writer, writer_handle) = LogWriter::open(config.writer, Arc::clone(&pool))?;
        let source = UnixSource::bind(config.source, Arc::clone(&pool), writer_handle.sender())?;

        let cancel = CancellationToken::new();
        let tracker = source.tracker();
        let source_metrics = source.metrics_handle();

        let writer_task = tokio::spawn(writer.run());
        let acceptor = tokio::spawn(source.run(cancel.clone()));

        tracing::info!(
            socket = %socket_path.display(),
            log = %log_path.display(),
            pool_size = config.pool_size,
            buffer_capacity = config.buffer_capacity,
            queue_size,
            "daemon started"
        );

        let coordinator = ShutdownCoordinator::new(cancel, tracker, writer_handle.clone());

        Ok(Self {
            socket_path,
            log_path,
            pool,
            source_metrics,
            writer: writer_handle,
            writer_task,
            acceptor,
            coordinator,
        })
    }

    /// Socket clients connect to
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Log file path
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Live metrics view that stays valid while `run()` owns the daemon
    pub fn monitor(&self) -> DaemonMonitor {
        DaemonMonitor {
            pool: Arc::clone(&self.pool),
            source_metrics: Arc::clone(&self.source_metrics),
            writer: self.writer.clone(),
        }
    }

    /// Serve until `Terminate`, the end of `events`, or a fatal writer error
    ///
    /// A fatal accept error stops taking new clients but keeps the writer and
    /// the existing connections alive until `Terminate`. `Rotate` events that
    /// arrive while connections drain are still forwarded to the writer.
    pub async fn run(self, mut events: mpsc::Receiver<DaemonEvent>) -> Result<DaemonReport> {
        let Self {
            pool,
            source_metrics,
            writer,
            mut writer_task,
            acceptor,
            coordinator,
            ..
        } = self;

        let mut acceptor = Some(acceptor);
        let mut rotations_requested = 0u64;
        let mut events_open = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(DaemonEvent::Rotate) => {
                        rotations_requested += 1;
                        request_rotation(&writer, rotations_requested).await;
                    }
                    Some(DaemonEvent::Terminate) => {
                        tracing::info!("terminate requested, shutting down");
                        break;
                    }
                    None => {
                        tracing::info!("event stream closed, shutting down");
                        events_open = false;
                        break;
                    }
                },

                result = &mut writer_task => {
                    tracing::error!("log writer stopped unexpectedly, shutting down");
                    coordinator.drain(acceptor.take()).await;

                    let snapshot = result??;
                    return Ok(DaemonReport {
                        source: source_metrics.snapshot(),
                        writer: snapshot,
                        pool: pool.metrics().snapshot(),
                        rotations_requested,
                    });
                }

                result = async {
                    match acceptor.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                }, if acceptor.is_some() => {
                    acceptor = None;
                    match result {
                        Ok(Ok(())) => tracing::warn!("acceptor stopped, no new connections"),
                        Ok(Err(e)) => tracing::error!(error = %e, "acceptor failed, serving existing connections"),
                        Err(e) => tracing::error!(error = %e, "acceptor task failed, serving existing connections"),
                    }
                }
            }
        }

        let drain = coordinator.drain(acceptor);
        tokio::pin!(drain);

        loop {
            tokio::select! {
                () = &mut drain => break,

                event = events.recv(), if events_open => match event {
                    Some(DaemonEvent::Rotate) => {
                        rotations_requested += 1;
                        request_rotation(&writer, rotations_requested).await;
                    }
                    Some(DaemonEvent::Terminate) => tracing::debug!("already shutting down"),
                    None => events_open = false,
                },
            }
        }

        let writer_snapshot = coordinator.finish(writer_task).await?;

        let report = DaemonReport {
            source: source_metrics.snapshot(),
            writer: writer_snapshot,
            pool: pool.metrics().snapshot(),
            rotations_requested,
        };

        tracing::info!(
            connections = report.source.connections_total,
            messages = report.writer.messages_written,
            bytes = report.writer.bytes_written,
            rotations = report.writer.rotations,
            syncs = report.writer.syncs,
            write_errors = report.writer.write_errors,
            pool_waits = report.pool.waits,
            "daemon stopped"
        );

        Ok(report)
    }
}

async fn request_rotation(writer: &LogWriterHandle, rotation: u64) {
    match writer.rotate().await {
        Ok(()) => tracing::info!(rotation, "rotation requested"),
        Err(e) => tracing::warn!(error = %e, "rotation not delivered"),
    }
}
