//! Serve command - Run the logd daemon
//!
//! Loads configuration, writes the pid file, starts the daemon and maps
//! process signals to daemon events:
//!
//! | Signal                    | Event       |
//! |---------------------------|-------------|
//! | SIGHUP                    | `Rotate`    |
//! | SIGINT, SIGTERM, SIGQUIT  | `Terminate` |

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use logd_config::Config;
use logd_pipeline::{Daemon, DaemonConfig, DaemonEvent};

/// Signals arriving faster than the daemon consumes them queue up here
const EVENT_QUEUE_SIZE: usize = 16;

/// Config files tried, in order, when `--config` is not given
const DEFAULT_CONFIG_PATHS: &[&str] = &["logd.toml", "configs/logd.toml"];

/// Serve command arguments
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Socket path (overrides [source] socket_path)
    #[arg(long)]
    pub sock: Option<String>,

    /// Log file path (overrides [sink] path)
    #[arg(long)]
    pub log: Option<String>,

    /// Runtime worker threads (overrides [global] worker_threads)
    #[arg(long)]
    pub procs: Option<usize>,
}

impl ServeArgs {
    /// Apply command line overrides on top of file values
    fn apply(&self, config: &mut Config) {
        if let Some(sock) = &self.sock {
            config.source.socket_path = sock.clone();
        }
        if let Some(log) = &self.log {
            config.sink.path = log.clone();
        }
        if let Some(procs) = self.procs {
            config.global.worker_threads = Some(procs);
        }
    }
}

/// Load configuration, apply overrides and validate the result
///
/// An explicit path must exist. Without one the default paths are tried and
/// built-in defaults used if none is found.
pub fn load_config(path: Option<&Path>, args: &ServeArgs) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "config file not found: {}",
                    path.display()
                ));
            }
            Config::from_file(path).context("failed to load configuration")?
        }
        None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        },
    };

    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    Ok(config)
}

/// Translate the file configuration into daemon settings
fn daemon_config(config: &Config) -> DaemonConfig {
    let mut daemon = DaemonConfig::new(&config.source.socket_path, &config.sink.path)
        .with_pool(config.global.pool_size, config.global.buffer_capacity)
        .with_queue_size(config.global.queue_size);

    daemon.source = daemon
        .source
        .with_read_timeout(config.source.read_timeout);
    if let Some(mode) = config.source.socket_mode {
        daemon.source = daemon.source.with_socket_mode(mode);
    }

    let sink = &config.sink;
    daemon.writer = daemon
        .writer
        .with_write_buffer_size(sink.write_buffer_size)
        .with_flush_interval(sink.flush_interval)
        .with_sync_every(sink.sync_every)
        .with_retries(sink.max_write_retries, sink.retry_delay);

    daemon
}

/// Run the serve command
pub async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "logd starting"
    );

    if let Err(e) = run_daemon(&config).await {
        error!(error = %e, "daemon error");
        return Err(e);
    }

    info!("logd shutdown complete");
    Ok(())
}

async fn run_daemon(config: &Config) -> Result<()> {
    let _pid_file = match &config.global.pid_file {
        Some(path) => Some(PidFile::create(path)?),
        None => None,
    };

    // Install handlers before the socket exists so no signal is missed
    let signals = SignalEvents::install().context("failed to install signal handlers")?;

    let daemon = Daemon::start(daemon_config(config)).context("failed to start daemon")?;

    info!(
        pid = std::process::id(),
        socket = %daemon.socket_path().display(),
        log = %daemon.log_path().display(),
        worker_threads = config.global.effective_worker_threads(),
        "logd ready"
    );

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let signal_task = tokio::spawn(signals.forward(events_tx));

    let result = daemon.run(events_rx).await;
    signal_task.abort();

    let report = result.context("daemon stopped with an error")?;

    info!(
        connections = report.source.connections_total,
        messages = report.writer.messages_written,
        bytes = report.writer.bytes_written,
        rotations = report.writer.rotations,
        syncs = report.writer.syncs,
        write_errors = report.writer.write_errors,
        read_timeouts = report.source.read_timeouts,
        pool_wait_rate = report.pool.wait_rate(),
        "final metrics"
    );

    Ok(())
}

// =============================================================================
// Signals
// =============================================================================

struct SignalEvents {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl SignalEvents {
    fn install() -> io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn next(&mut self) -> Option<(&'static str, DaemonEvent)> {
        tokio::select! {
            Some(()) = self.hangup.recv() => Some(("SIGHUP", DaemonEvent::Rotate)),
            Some(()) = self.interrupt.recv() => Some(("SIGINT", DaemonEvent::Terminate)),
            Some(()) = self.terminate.recv() => Some(("SIGTERM", DaemonEvent::Terminate)),
            Some(()) = self.quit.recv() => Some(("SIGQUIT", DaemonEvent::Terminate)),
            else => None,
        }
    }

    /// Forward signals as daemon events until the daemon stops listening
    async fn forward(mut self, events: mpsc::Sender<DaemonEvent>) {
        while let Some((name, event)) = self.next().await {
            info!(signal = name, event = %event, "signal received");
            if events.send(event).await.is_err() {
                break;
            }
        }
    }
}

// =============================================================================
// Pid file
// =============================================================================

/// Pid file that removes itself on drop
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("failed to write pid file {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}
