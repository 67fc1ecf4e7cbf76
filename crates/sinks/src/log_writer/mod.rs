//! Log Writer - the single serializing consumer
//!
//! Owns the log file. Every message from every connection passes through this
//! one task, so lines are never interleaved and rotation needs no locking.
//!
//! # Events
//!
//! Messages and control commands share one FIFO queue of [`WriterEvent`]s,
//! so a command takes effect exactly at its place in line. Alongside the
//! queue the writer runs a flush tick.
//!
//! - **Message**: append `data` + `\n`, then return the buffer to the pool
//! - **Control**: `Rotate` reopens the file at the same path, `Quit` closes the
//!   queue, writes what is left in it and ends the task
//! - **Flush tick**: push the write buffer to the OS every `flush_interval`
//!
//! Messages enqueued before a rotate land in the old file and messages
//! enqueued after it land in the new file.
//!
//! # Rotation
//!
//! ```text
//! mv log.out log.out.1      # external tool renames the file
//! kill -HUP <pid>           # daemon sends Rotate
//!   -> earlier queue entries already went to log.out.1 (the open handle)
//!   -> flush + fsync
//!   -> open new log.out, close the old handle
//! ```
//!
//! A failure to open the new file is fatal: the writer terminates and
//! returns [`LogWriterError::Reopen`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use logd_protocol::{BufferPool, ControlCommand, DEFAULT_QUEUE_SIZE, Message, WriterEvent};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::util::{LogFile, RateLimitedLogger};

/// Default write buffer size (64KB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Default flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Default write attempts per message
pub const DEFAULT_WRITE_RETRIES: usize = 3;

/// Default delay between write attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Configuration for the log writer
#[derive(Debug, Clone)]
pub struct LogWriterConfig {
    /// Log file path
    pub path: PathBuf,

    /// Event queue capacity, shared by messages and control commands
    pub queue_size: usize,

    /// Line buffer size in front of the file
    pub write_buffer_size: usize,

    /// Periodic flush interval
    pub flush_interval: Duration,

    /// fsync after this many messages (0 = only on rotate and quit)
    pub sync_every: u64,

    /// Attempts per message before counting a write error
    pub max_write_retries: usize,

    /// Delay between attempts
    pub retry_delay: Duration,
}

impl Default for LogWriterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("log.out"),
            queue_size: DEFAULT_QUEUE_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            sync_every: 0,
            max_write_retries: DEFAULT_WRITE_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl LogWriterConfig {
    /// Create config for the given log path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the event queue capacity
    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    /// Set the write buffer size
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set the flush interval
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// fsync after every `n` messages
    pub fn with_sync_every(mut self, n: u64) -> Self {
        self.sync_every = n;
        self
    }

    /// Set the write retry policy
    pub fn with_retries(mut self, max_write_retries: usize, retry_delay: Duration) -> Self {
        self.max_write_retries = max_write_retries;
        self.retry_delay = retry_delay;
        self
    }
}

/// Writer lifecycle; `Terminated` is final
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Running,
    Terminated,
}

/// Metrics for the log writer
#[derive(Debug, Default)]
pub struct LogWriterMetrics {
    /// Messages written
    pub messages_written: AtomicU64,

    /// Bytes written, newlines included
    pub bytes_written: AtomicU64,

    /// Messages dropped after all write attempts failed
    pub write_errors: AtomicU64,

    /// Flushes of a non-empty write buffer
    pub flushes: AtomicU64,

    /// fsyncs performed
    pub syncs: AtomicU64,

    /// Completed rotations
    pub rotations: AtomicU64,
}

impl LogWriterMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            messages_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_write(&self, bytes: u64) {
        self.messages_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    fn record_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot {
            messages_written: self.messages_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of writer metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterMetricsSnapshot {
    pub messages_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub flushes: u64,
    pub syncs: u64,
    pub rotations: u64,
}

/// Errors from the log writer
#[derive(Debug, thiserror::Error)]
pub enum LogWriterError {
    /// Could not open the log file at startup
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not open a new log file during rotation
    #[error("failed to reopen log file {path} during rotation: {source}")]
    Reopen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The writer has already terminated
    #[error("log writer is no longer running")]
    Closed,
}

/// Handle for controlling a running [`LogWriter`]
///
/// Cheap to clone. Once every handle and every sender from [`sender`] is
/// dropped, the writer behaves as if it got `Quit`.
///
/// [`sender`]: LogWriterHandle::sender
#[derive(Clone)]
pub struct LogWriterHandle {
    events: mpsc::Sender<WriterEvent>,
    state: watch::Receiver<WriterState>,
    metrics: Arc<LogWriterMetrics>,
}

impl LogWriterHandle {
    /// Ask the writer to reopen its file
    pub async fn rotate(&self) -> Result<(), LogWriterError> {
        self.send(ControlCommand::Rotate).await
    }

    /// Ask the writer to write what is queued, close its file and stop
    pub async fn quit(&self) -> Result<(), LogWriterError> {
        self.send(ControlCommand::Quit).await
    }

    async fn send(&self, command: ControlCommand) -> Result<(), LogWriterError> {
        self.events
            .send(command.into())
            .await
            .map_err(|_| LogWriterError::Closed)
    }

    /// Sender for producers feeding messages into the queue
    pub fn sender(&self) -> mpsc::Sender<WriterEvent> {
        self.events.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> WriterState {
        *self.state.borrow()
    }

    /// Wait until the writer has terminated
    pub async fn wait_terminated(&self) {
        let mut state = self.state.clone();
        // A dropped sender means the task is gone, which is terminal too.
        let _ = state.wait_for(|s| *s == WriterState::Terminated).await;
    }

    /// Current writer metrics
    pub fn metrics(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Single task writing every message to the log file
pub struct LogWriter {
    config: LogWriterConfig,
    file: LogFile,
    events: mpsc::Receiver<WriterEvent>,
    pool: Arc<BufferPool>,
    state: watch::Sender<WriterState>,
    metrics: Arc<LogWriterMetrics>,
    error_logger: RateLimitedLogger,
    since_sync: u64,
}

impl LogWriter {
    /// Open the log file and create the writer with its handle
    ///
    /// Buffers of consumed messages are returned to `pool`.
    pub fn open(
        config: LogWriterConfig,
        pool: Arc<BufferPool>,
    ) -> Result<(Self, LogWriterHandle), LogWriterError> {
        let file = LogFile::open(&config.path, config.write_buffer_size).map_err(|e| {
            LogWriterError::Open {
                path: config.path.display().to_string(),
                source: e,
            }
        })?;

        let (events_tx, events_rx) = mpsc::channel(config.queue_size.max(1));
        let (state_tx, state_rx) = watch::channel(WriterState::Running);
        let metrics = Arc::new(LogWriterMetrics::new());

        tracing::info!(path = %config.path.display(), "log file opened");

        let handle = LogWriterHandle {
            events: events_tx,
            state: state_rx,
            metrics: Arc::clone(&metrics),
        };

        let writer = Self {
            config,
            file,
            events: events_rx,
            pool,
            state: state_tx,
            metrics,
            error_logger: RateLimitedLogger::default(),
            since_sync: 0,
        };

        Ok((writer, handle))
    }

    /// Run until `Quit` (or every sender is dropped) or a fatal rotation error
    ///
    /// The file is flushed, synced and closed exactly once on the way out, and
    /// the state moves to `Terminated` after that.
    pub async fn run(mut self) -> Result<WriterMetricsSnapshot, LogWriterError> {
        let result = self.event_loop().await;

        let Self {
            file,
            state,
            metrics,
            ..
        } = self;

        let path = file.path().display().to_string();
        match file.close() {
            Ok(bytes) => {
                metrics.syncs.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path, bytes, "log file closed");
            }
            Err(e) => tracing::error!(path = %path, error = %e, "final flush failed"),
        }

        state.send_replace(WriterState::Terminated);

        let snapshot = metrics.snapshot();
        tracing::info!(
            messages = snapshot.messages_written,
            bytes = snapshot.bytes_written,
            rotations = snapshot.rotations,
            write_errors = snapshot.write_errors,
            "log writer terminated"
        );

        result.map(|()| snapshot)
    }

    async fn event_loop(&mut self) -> Result<(), LogWriterError> {
        let mut flush_ticker = tokio::time::interval(self.config.flush_interval);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(WriterEvent::Message(message)) => self.write_message(message).await,
                    Some(WriterEvent::Control(ControlCommand::Rotate)) => self.rotate()?,
                    Some(WriterEvent::Control(ControlCommand::Quit)) => {
                        self.finish().await;
                        return Ok(());
                    }
                    None => {
                        tracing::warn!("every sender dropped without quit, shutting down");
                        return Ok(());
                    }
                },
                _ = flush_ticker.tick() => self.flush(),
            }
        }
    }

    /// Close the queue and write the messages still in it
    async fn finish(&mut self) {
        self.events.close();
        while let Some(event) = self.events.recv().await {
            match event {
                WriterEvent::Message(message) => self.write_message(message).await,
                WriterEvent::Control(command) => {
                    tracing::debug!(command = %command, "control command after quit ignored");
                }
            }
        }
    }

    async fn write_message(&mut self, message: Message) {
        let max_attempts = self.config.max_write_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match self.file.write_line(message.as_bytes()) {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    if attempt + 1 < max_attempts {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_attempts,
                            error = %e,
                            "write failed, retrying"
                        );
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => {
                self.metrics.record_write(message.len() as u64 + 1);
                self.since_sync += 1;
                if self.config.sync_every > 0 && self.since_sync >= self.config.sync_every {
                    self.sync();
                }
            }
            Some(e) => {
                self.metrics.record_error();
                self.error_logger.error_with_data(
                    "write failed after all retries",
                    &e,
                    message.as_bytes(),
                );
            }
        }

        self.pool.release(message.into_buffer());
    }

    fn flush(&mut self) {
        if !self.file.has_pending() {
            return;
        }
        match self.file.flush() {
            Ok(()) => {
                self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.error_logger.error("flush failed", &e);
            }
        }
    }

    fn sync(&mut self) {
        self.since_sync = 0;
        match self.file.sync() {
            Ok(()) => {
                self.metrics.syncs.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.error_logger.error("fsync failed", &e);
            }
        }
    }

    fn rotate(&mut self) -> Result<(), LogWriterError> {
        self.sync();

        let file = LogFile::open(&self.config.path, self.config.write_buffer_size).map_err(|e| {
            tracing::error!(path = %self.config.path.display(), error = %e, "rotation failed");
            LogWriterError::Reopen {
                path: self.config.path.display().to_string(),
                source: e,
            }
        })?;

        let old = std::mem::replace(&mut self.file, file);
        let old_bytes = old.bytes_written();
        if let Err(e) = old.close() {
            self.error_logger.error("closing rotated file failed", &e);
        }

        let rotations = self.metrics.rotations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            path = %self.config.path.display(),
            rotations,
            previous_bytes = old_bytes,
            "log file rotated"
        );

        Ok(())
    }
}

#[cfg(test)]
#[path = "log_writer_test.rs"]
mod log_writer_test;
