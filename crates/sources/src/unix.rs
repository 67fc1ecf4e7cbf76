//! Unix socket source
//!
//! Accepts local stream connections and forwards whatever each client writes
//! to the log writer, one pooled buffer per read.
//!
//! # Framing
//!
//! There is no length prefix. A single read fills at most one buffer
//! (`buffer_capacity` bytes) and that read becomes one message. A client write
//! longer than the buffer is split across several messages.
//!
//! # Backpressure
//!
//! Every read needs a buffer from the shared [`BufferPool`]. When all buffers
//! are in flight (queued for or held by the writer) handlers wait in
//! `acquire()` and stop reading from their sockets. The bounded message queue
//! adds a second waiting point in front of the writer.
//!
//! # Shutdown
//!
//! On cancellation a handler stops waiting on its client but still forwards
//! whatever the client already wrote: it reads until the socket would block or
//! reaches end of stream, then closes the connection.
//!
//! # Example
//!
//! ```ignore
//! use logd_protocol::{BufferPool, WriterEvent};
//! use logd_sources::{UnixSource, UnixSourceConfig};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let pool = Arc::new(BufferPool::new(64, 4096));
//! let (tx, rx) = mpsc::channel::<WriterEvent>(1024);
//!
//! let source = UnixSource::bind(UnixSourceConfig::new("logd.sock"), pool, tx)?;
//! let tracker = source.tracker();
//! source.run(CancellationToken::new()).await?;
//! ```

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use logd_protocol::{BufferPool, BufferPoolError, Message, WriterEvent};
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::common::SourceMetrics;

/// Default per-read timeout
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause after a temporary accept error before accepting again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on reads while flushing out a connection at shutdown
const MAX_DRAIN_READS: usize = 1024;

/// Too many open files (process)
const EMFILE: i32 = 24;

/// Too many open files (system)
const ENFILE: i32 = 23;

/// Unix source configuration
#[derive(Debug, Clone)]
pub struct UnixSourceConfig {
    /// Socket path; a stale file at this path is removed before binding
    pub socket_path: PathBuf,

    /// Per-read timeout
    pub read_timeout: Duration,

    /// Permission bits applied to the socket after binding
    pub socket_mode: Option<u32>,
}

impl Default for UnixSourceConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("logd.sock"),
            read_timeout: DEFAULT_READ_TIMEOUT,
            socket_mode: None,
        }
    }
}

impl UnixSourceConfig {
    /// Create config for the given socket path
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    /// Set the read timeout
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Set the socket permission bits
    pub fn with_socket_mode(mut self, mode: u32) -> Self {
        self.socket_mode = Some(mode);
        self
    }
}

/// Unix source errors
#[derive(Debug, thiserror::Error)]
pub enum UnixSourceError {
    /// Failed to bind the socket
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to remove a stale socket file
    #[error("failed to remove stale socket {path}: {source}")]
    RemoveStale {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to apply socket permissions
    #[error("failed to set permissions on {path}: {source}")]
    Permissions {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Unrecoverable accept error
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Connection I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Writer queue closed
    #[error("message channel closed")]
    ChannelClosed,

    /// Buffer pool error
    #[error("buffer pool error: {0}")]
    Pool(#[from] BufferPoolError),
}

/// State shared by every connection handler
struct HandlerContext {
    pool: Arc<BufferPool>,
    sender: mpsc::Sender<WriterEvent>,
    metrics: Arc<SourceMetrics>,
    read_timeout: Duration,
}

/// Unix stream socket source
///
/// Binding happens in [`UnixSource::bind`] so startup failures surface before
/// any task is spawned; [`UnixSource::run`] then accepts until cancelled.
pub struct UnixSource {
    config: UnixSourceConfig,
    listener: UnixListener,
    context: Arc<HandlerContext>,
    tracker: TaskTracker,
}

impl UnixSource {
    /// Bind the listening socket
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        config: UnixSourceConfig,
        pool: Arc<BufferPool>,
        sender: mpsc::Sender<WriterEvent>,
    ) -> Result<Self, UnixSourceError> {
        let listener = prepare_listener(&config.socket_path, config.socket_mode)?;

        tracing::info!(
            path = %config.socket_path.display(),
            read_timeout = ?config.read_timeout,
            "unix source listening"
        );

        let context = Arc::new(HandlerContext {
            pool,
            sender,
            metrics: Arc::new(SourceMetrics::new()),
            read_timeout: config.read_timeout,
        });

        Ok(Self {
            config,
            listener,
            context,
            tracker: TaskTracker::new(),
        })
    }

    /// Get reference to metrics
    pub fn metrics(&self) -> &SourceMetrics {
        &self.context.metrics
    }

    /// Get a metrics handle that outlives `run()`
    pub fn metrics_handle(&self) -> Arc<SourceMetrics> {
        Arc::clone(&self.context.metrics)
    }

    /// Tracker holding one task per live connection
    ///
    /// Close it and wait on it after cancelling to drain handlers.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Path the source is listening on
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Accept connections until `cancel` fires or accept fails fatally
    ///
    /// The socket file is removed before returning. Handlers already spawned
    /// keep running until their client leaves or a read fails. Once they see
    /// the cancellation they forward what is already readable and stop.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), UnixSourceError> {
        let result = self.accept_loop(&cancel).await;

        let Self {
            config, listener, ..
        } = self;
        drop(listener);
        remove_socket_file(&config.socket_path);

        match &result {
            Ok(()) => tracing::info!(path = %config.socket_path.display(), "unix source stopped"),
            Err(e) => tracing::error!(error = %e, "unix source stopped on fatal accept error"),
        }

        result
    }

    async fn accept_loop(&self, cancel: &CancellationToken) -> Result<(), UnixSourceError> {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(()),

                result = self.listener.accept() => match result {
                    Ok((stream, _)) => {
                        if cancel.is_cancelled() {
                            return Ok(());
                        }

                        let id = self.context.metrics.connection_opened();
                        tracing::debug!(connection = id, "client connected");

                        let context = Arc::clone(&self.context);
                        let cancel = cancel.clone();
                        self.tracker.spawn(async move {
                            if let Err(e) = handle_connection(stream, &context, &cancel).await {
                                context.metrics.error();
                                tracing::debug!(connection = id, error = %e, "connection error");
                            }
                            context.metrics.connection_closed();
                        });
                    }
                    Err(e) if is_temporary(&e) => {
                        tracing::warn!(error = %e, "temporary accept error, retrying");
                        self.context.metrics.accept_retry();
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        self.context.metrics.error();
                        return Err(UnixSourceError::Accept(e));
                    }
                },
            }
        }
    }
}

/// Read loop for one client
///
/// Each successful read is forwarded as one message; the buffer travels with
/// it and is returned to the pool by the writer.
async fn handle_connection(
    mut stream: UnixStream,
    context: &HandlerContext,
    cancel: &CancellationToken,
) -> Result<(), UnixSourceError> {
    let pool = &context.pool;
    let limit = pool.buffer_capacity() as u64;

    while !cancel.is_cancelled() {
        let mut buf = tokio::select! {
            _ = cancel.cancelled() => break,
            buf = pool.acquire() => buf?,
        };

        let mut limited = (&mut stream).take(limit);
        let read = limited.read_buf(&mut buf);
        match timeout(context.read_timeout, read).await {
            Err(_) => {
                context.metrics.read_timeout();
                pool.release(buf);
            }
            Ok(Ok(0)) => {
                pool.release(buf);
                tracing::debug!("client disconnected");
                return Ok(());
            }
            Ok(Ok(_)) => forward(context, Message::new(buf)).await?,
            Ok(Err(e)) => {
                pool.release(buf);
                return Err(UnixSourceError::Io(e));
            }
        }
    }

    drain_pending(stream, context).await
}

/// Forward what the client already wrote without waiting for more
///
/// The std stream keeps the nonblocking mode set by tokio, so a read with
/// nothing buffered returns `WouldBlock` instead of parking the thread.
async fn drain_pending(stream: UnixStream, context: &HandlerContext) -> Result<(), UnixSourceError> {
    let mut stream = stream.into_std()?;
    let pool = &context.pool;
    let limit = pool.buffer_capacity();

    for _ in 0..MAX_DRAIN_READS {
        let mut buf = pool.acquire().await?;
        buf.resize(limit, 0);

        match stream.read(&mut buf) {
            Ok(0) => {
                pool.release(buf);
                return Ok(());
            }
            Ok(n) => {
                buf.truncate(n);
                tracing::debug!(bytes = n, "forwarding pending data at shutdown");
                forward(context, Message::new(buf)).await?;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                pool.release(buf);
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => pool.release(buf),
            Err(e) => {
                pool.release(buf);
                return Err(UnixSourceError::Io(e));
            }
        }
    }

    tracing::debug!("client still writing at shutdown, closing connection");
    Ok(())
}

/// Queue one message for the writer; a closed queue hands the buffer back
async fn forward(context: &HandlerContext, message: Message) -> Result<(), UnixSourceError> {
    context.metrics.message_received(message.len() as u64);
    if let Err(mpsc::error::SendError(event)) = context.sender.send(message.into()).await {
        if let Some(message) = event.into_message() {
            context.pool.release(message.into_buffer());
        }
        return Err(UnixSourceError::ChannelClosed);
    }
    Ok(())
}

/// Remove a stale socket, bind, and apply permissions
fn prepare_listener(path: &Path, mode: Option<u32>) -> Result<UnixListener, UnixSourceError> {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(UnixSourceError::RemoveStale {
                path: path.display().to_string(),
                source: e,
            });
        }
    }

    let listener = UnixListener::bind(path).map_err(|e| UnixSourceError::Bind {
        path: path.display().to_string(),
        source: e,
    })?;

    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
            UnixSourceError::Permissions {
                path: path.display().to_string(),
                source: e,
            }
        })?;
    }

    Ok(listener)
}

fn remove_socket_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove socket"),
    }
}

/// Accept errors worth retrying
pub(crate) fn is_temporary(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        _ => matches!(e.raw_os_error(), Some(EMFILE) | Some(ENFILE)),
    }
}

#[cfg(test)]
#[path = "unix_test.rs"]
mod unix_test;
