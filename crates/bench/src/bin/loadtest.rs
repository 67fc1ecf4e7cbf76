//! Load test binary
//!
//! Run against a live daemon to measure throughput with concurrent clients.
//! Every message is sequence-tagged, so the resulting log can be checked for
//! per-client ordering afterwards.
//!
//! Usage:
//!   cargo run --release -p logd-bench --bin loadtest -- --socket logd.sock
//!   cargo run --release -p logd-bench --bin loadtest -- --clients 100 --messages 10000
//!
//! Rotation under load is exercised by sending SIGHUP to the daemon while
//! this runs (`kill -HUP $(cat logd.pid)`).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use logd_bench::LoadScenario;
use logd_client::test::UnixTestClient;
use logd_client::{ClientError, tagged_message};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Load test configuration
#[derive(Parser, Debug)]
#[command(name = "loadtest", about = "logd load test")]
struct Args {
    /// Daemon socket
    #[arg(short, long, default_value = "logd.sock")]
    socket: PathBuf,

    /// Number of concurrent clients
    #[arg(short, long, default_value = "10")]
    clients: usize,

    /// Messages per client
    #[arg(short, long, default_value = "10000")]
    messages: u64,

    /// Bytes per message; match the daemon's buffer capacity for one line per write
    #[arg(short, long, default_value = "96")]
    width: usize,

    /// Pause before reconnecting after a retryable error, in milliseconds
    #[arg(long, default_value = "100")]
    throttle_ms: u64,

    /// Give up on a message after this many reconnects
    #[arg(long, default_value = "50")]
    max_retries: u32,

    /// Report interval in seconds
    #[arg(short, long, default_value = "1")]
    report_interval: u64,

    /// Use a named scenario (overrides clients/messages/width)
    /// Options: smoke, punish, wide
    #[arg(short, long)]
    preset: Option<String>,
}

impl Args {
    /// Apply preset configuration, overriding individual flags
    fn apply_preset(mut self) -> Result<Self, String> {
        if let Some(preset) = &self.preset {
            let scenario = LoadScenario::find(preset)
                .ok_or_else(|| format!("Unknown preset: '{}'. Available: smoke, punish, wide", preset))?;
            self.clients = scenario.clients;
            self.messages = scenario.messages_per_client;
            self.width = scenario.message_width;
        }
        Ok(self)
    }
}

/// Shared metrics
#[derive(Default)]
struct Metrics {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    reconnects: AtomicU64,
    errors: AtomicU64,
    clients_connected: AtomicU64,
    clients_done: AtomicU64,
}

/// Client configuration for load testing
#[derive(Clone)]
struct ClientConfig {
    socket: PathBuf,
    messages: u64,
    width: usize,
    throttle: Duration,
    max_retries: u32,
}

/// Connect, retrying while the daemon is restarting or overloaded
async fn connect(config: &ClientConfig, metrics: &Metrics) -> Result<UnixTestClient, ClientError> {
    let mut attempts = 0;
    loop {
        match UnixTestClient::connect(&config.socket).await {
            Ok(client) => return Ok(client),
            Err(e) if e.is_retryable() && attempts < config.max_retries => {
                attempts += 1;
                metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(config.throttle).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run a single client
async fn run_client(
    client_id: u32,
    config: ClientConfig,
    metrics: Arc<Metrics>,
    start_signal: Arc<Semaphore>,
) {
    let mut client = match connect(&config, &metrics).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Client {} failed to connect: {}", client_id, e);
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    metrics.clients_connected.fetch_add(1, Ordering::Relaxed);

    // Wait for start signal (all clients connected)
    let _ = start_signal.acquire().await;

    'messages: for seq in 1..=config.messages {
        let message = tagged_message(client_id, seq, config.width);
        let mut retries = 0;

        loop {
            match client.send(&message).await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && retries < config.max_retries => {
                    retries += 1;
                    metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(config.throttle).await;
                    client = match connect(&config, &metrics).await {
                        Ok(c) => c,
                        Err(e) => {
                            eprintln!("Client {} lost the daemon: {}", client_id, e);
                            metrics.errors.fetch_add(1, Ordering::Relaxed);
                            break 'messages;
                        }
                    };
                }
                Err(e) => {
                    eprintln!("Client {} send error: {}", client_id, e);
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break 'messages;
                }
            }
        }

        metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
        metrics.bytes_sent.fetch_add(message.len() as u64, Ordering::Relaxed);
    }

    let _ = client.flush().await;
    let _ = client.close().await;

    metrics.clients_done.fetch_add(1, Ordering::Relaxed);
}

/// Reporter task - prints metrics every interval
async fn reporter(
    metrics: Arc<Metrics>,
    total_messages: u64,
    num_clients: usize,
    report_interval: Duration,
    start_time: Instant,
) {
    let mut last_messages = 0u64;
    let mut last_bytes = 0u64;
    let mut last_time = start_time;

    // Intervals with every client still sending
    let mut sustained_rates: Vec<f64> = Vec::new();

    loop {
        tokio::time::sleep(report_interval).await;

        let now = Instant::now();
        let current_messages = metrics.messages_sent.load(Ordering::Relaxed);
        let current_bytes = metrics.bytes_sent.load(Ordering::Relaxed);
        let reconnects = metrics.reconnects.load(Ordering::Relaxed);
        let errors = metrics.errors.load(Ordering::Relaxed);
        let connected = metrics.clients_connected.load(Ordering::Relaxed);
        let done = metrics.clients_done.load(Ordering::Relaxed);

        let interval_messages = current_messages - last_messages;
        let interval_bytes = current_bytes - last_bytes;
        let interval_secs = now.duration_since(last_time).as_secs_f64();

        let messages_per_sec = interval_messages as f64 / interval_secs;
        let mb_per_sec = (interval_bytes as f64 / 1_000_000.0) / interval_secs;

        let active_clients = connected.saturating_sub(done);
        if active_clients == num_clients as u64 {
            sustained_rates.push(messages_per_sec);
        }

        let total_secs = now.duration_since(start_time).as_secs_f64();
        let progress = (current_messages as f64 / total_messages as f64) * 100.0;

        println!(
            "[{:>6.1}s] {:>10.0} msg/s | {:>8.1} MB/s | {:>10} messages ({:>5.1}%) | clients: {}/{} | reconnects: {} | errors: {}",
            total_secs,
            messages_per_sec,
            mb_per_sec,
            current_messages,
            progress,
            active_clients,
            num_clients,
            reconnects,
            errors,
        );

        last_messages = current_messages;
        last_bytes = current_bytes;
        last_time = now;

        if done >= connected || current_messages >= total_messages {
            let overall_rate = current_messages as f64 / total_secs;
            let sustained_rate = if sustained_rates.is_empty() {
                overall_rate
            } else {
                sustained_rates.iter().sum::<f64>() / sustained_rates.len() as f64
            };

            println!();
            println!(
                "Results   | Sustained: {:.0} msg/s | Overall: {:.0} msg/s | {:.2}s | {} messages | {} MB | {} reconnects | {} errors",
                sustained_rate,
                overall_rate,
                total_secs,
                current_messages,
                current_bytes / 1_000_000,
                reconnects,
                errors
            );
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().apply_preset()?;

    if args.clients == 0 || args.messages == 0 {
        return Err("clients and messages must be at least 1".into());
    }

    let total_messages = args.clients as u64 * args.messages;

    println!(
        "Load Test | {} | {} clients | {} messages | width {}",
        args.socket.display(),
        args.clients,
        total_messages,
        args.width
    );
    if let Some(preset) = &args.preset {
        println!("Preset    | {}", preset);
    }

    let metrics = Arc::new(Metrics::default());

    // Semaphore to synchronize start (initially no permits)
    let start_signal = Arc::new(Semaphore::new(0));
    let mut clients = JoinSet::new();

    print!("Connecting {} clients... ", args.clients);

    let client_config = ClientConfig {
        socket: args.socket.clone(),
        messages: args.messages,
        width: args.width,
        throttle: Duration::from_millis(args.throttle_ms),
        max_retries: args.max_retries,
    };

    for i in 0..args.clients {
        clients.spawn(run_client(
            i as u32,
            client_config.clone(),
            Arc::clone(&metrics),
            Arc::clone(&start_signal),
        ));
    }

    // Wait for all clients to connect
    tokio::time::sleep(Duration::from_millis(500)).await;

    let connected = metrics.clients_connected.load(Ordering::Relaxed);
    println!("{}/{} connected", connected, args.clients);

    if connected == 0 {
        println!("No clients connected. Is logd running?");
        return Ok(());
    }

    let start_time = Instant::now();
    start_signal.add_permits(args.clients);

    let reporter_handle = tokio::spawn(reporter(
        Arc::clone(&metrics),
        total_messages,
        args.clients,
        Duration::from_secs(args.report_interval.max(1)),
        start_time,
    ));

    while let Some(result) = clients.join_next().await {
        if let Err(e) = result {
            eprintln!("Client task error: {}", e);
        }
    }

    let _ = reporter_handle.await;

    Ok(())
}
