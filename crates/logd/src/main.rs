//! logd - Unix socket log daemon
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon (default)
//! logd
//! logd --config logd.toml
//!
//! # Override paths and worker threads
//! logd serve --sock /run/logd.sock --log /var/log/app.log --procs 2
//!
//! # Rotate: move the file away, then
//! kill -HUP $(cat logd.pid)
//! ```

mod cmd;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logd_config::{LogConfig, LogFormat, LogOutput};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// logd - append everything written to a Unix socket to a log file
#[derive(Parser, Debug)]
#[command(name = "logd")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon
    Serve(cmd::serve::ServeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // No subcommand = serve with config-file values only
    let args = match cli.command {
        Some(Command::Serve(args)) => args,
        None => cmd::serve::ServeArgs::default(),
    };

    let config = cmd::serve::load_config(cli.config.as_deref(), &args)?;
    init_logging(&config.log, cli.log_level.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.global.effective_worker_threads())
        .thread_name("logd-worker")
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(cmd::serve::run(config))
}

/// Initialize the tracing subscriber for logging
///
/// Level: CLI flag > config file. Format and destination come from `[log]`.
fn init_logging(log: &LogConfig, cli_level: Option<&str>) -> Result<()> {
    let level = cli_level.unwrap_or(log.level.as_str());
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let layer = match &log.output {
        LogOutput::Stdout => fmt_layer(log.format, std::io::stdout, true),
        LogOutput::Stderr => fmt_layer(log.format, std::io::stderr, true),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log output {path}"))?;
            fmt_layer(log.format, Mutex::new(file), false)
        }
    };

    tracing_subscriber::registry().with(layer).with(filter).init();

    Ok(())
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Console => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
    }
}
