//! Beacon Cache Driver
//!
//! Exercises the beacon cache the way an agent does: many producer sessions
//! insert event and action data, one sender drains it in chunks, and the
//! evictor keeps the cache bounded.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │  Producers   │───▶│ BeaconCache  │───▶│    Sender    │
//! │  (sessions)  │    │              │    │ (simulated)  │
//! └──────────────┘    └──────┬───────┘    └──────────────┘
//!                            │ notify
//!                     ┌──────▼───────┐
//!                     │   Evictor    │
//!                     └──────────────┘
//! ```
//!
//! The sender never talks to a network; every Nth transmission is reported
//! as failed to exercise the reset path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use prometheus::{Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beacon_cache::{
    BeaconCache, BeaconCacheConfig, BeaconCacheEvictor, BeaconKey, PrometheusExporter,
    SystemTimingProvider, TimingProvider,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Beacon cache driver - simulated producers and sender around the cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML file with eviction limits (defaults are used when absent)
    #[arg(long, env = "BEACON_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of concurrent producer sessions
    #[arg(long, env = "SESSIONS", default_value = "8")]
    sessions: u32,

    /// Records inserted by each session
    #[arg(long, env = "RECORDS_PER_SESSION", default_value = "1000")]
    records_per_session: u32,

    /// Payload size of each record in bytes
    #[arg(long, env = "PAYLOAD_SIZE", default_value = "64")]
    payload_size: usize,

    /// Maximum chunk size handed to the transport
    #[arg(long, env = "MAX_CHUNK_SIZE", default_value = "30720")]
    max_chunk_size: usize,

    /// Interval between sender passes in milliseconds
    #[arg(long, env = "SEND_INTERVAL_MS", default_value = "50")]
    send_interval_ms: u64,

    /// Report every Nth transmission as failed (0 never fails)
    #[arg(long, env = "FAILURE_EVERY", default_value = "5")]
    failure_every: u64,

    /// Print Prometheus metrics on exit
    #[arg(long, env = "PRINT_METRICS")]
    print_metrics: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => BeaconCacheConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BeaconCacheConfig::default(),
    };

    info!("Starting beacon cache driver");
    info!("  Sessions: {}", args.sessions);
    info!("  Records per session: {}", args.records_per_session);
    info!("  Max chunk size: {} bytes", args.max_chunk_size);
    info!("  Max record age: {} ms", config.max_record_age_ms);
    info!(
        "  Memory bounds: {} / {} bytes",
        config.cache_size_lower_bound, config.cache_size_upper_bound
    );

    let cache = Arc::new(BeaconCache::new());
    let timing: Arc<dyn TimingProvider> = Arc::new(SystemTimingProvider);

    let registry = Registry::new();
    let exporter = PrometheusExporter::register(&registry)?;

    let evictor = BeaconCacheEvictor::new(Arc::clone(&cache), &config, Arc::clone(&timing));
    evictor.start()?;

    // Producers
    let mut producers = Vec::with_capacity(args.sessions as usize);
    for session in 0..args.sessions {
        let cache = Arc::clone(&cache);
        let timing = Arc::clone(&timing);
        let records = args.records_per_session;
        let payload_size = args.payload_size;
        producers.push(tokio::task::spawn_blocking(move || {
            produce(&cache, timing.as_ref(), session as BeaconKey, records, payload_size)
        }));
    }

    // Sender
    let shutdown = CancellationToken::new();
    let sender = {
        let cache = Arc::clone(&cache);
        let shutdown = shutdown.clone();
        let mut transport = SimulatedTransport::new(args.failure_every);
        let interval = Duration::from_millis(args.send_interval_ms);
        let max_chunk_size = args.max_chunk_size;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => send_pass(&cache, &mut transport, max_chunk_size),
                }
            }
            transport
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
        }
        _ = wait_for_producers(producers) => {
            info!("All producers finished");
        }
    }

    shutdown.cancel();
    let mut transport = sender.await.context("sender task failed")?;

    // Deliver whatever is left, without simulated failures
    transport.failure_every = 0;
    send_pass(&cache, &mut transport, args.max_chunk_size);

    if !evictor.stop(Duration::from_secs(5)).await {
        warn!("Evictor did not stop within 5s");
    }

    let snapshot = cache.metrics().snapshot();
    exporter.update(&snapshot, cache.num_bytes_in_cache(), cache.len());

    info!("Driver finished");
    info!("  Records added: {}", snapshot.records_added());
    info!("  Records evicted: {}", snapshot.records_evicted());
    info!("  Records delivered: {}", snapshot.records_committed);
    info!("  Chunks sent: {} ({} failed)", transport.sent, transport.failed);
    info!("  Bytes left in cache: {}", cache.num_bytes_in_cache());

    if args.print_metrics {
        let text = TextEncoder::new().encode_to_string(&registry.gather())?;
        println!("{}", text);
    }

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("tokio=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Producers
// =============================================================================

fn produce(
    cache: &BeaconCache,
    timing: &dyn TimingProvider,
    key: BeaconKey,
    records: u32,
    payload_size: usize,
) {
    for i in 0..records {
        let payload = format!("et={}&it={}&pl={}", i % 20, i, "x".repeat(payload_size));
        if i % 4 == 0 {
            cache.add_action_data(key, timing.now_millis(), payload);
        } else {
            cache.add_event_data(key, timing.now_millis(), payload);
        }
    }
    debug!(beacon = key, records, "Producer finished");
}

async fn wait_for_producers(producers: Vec<tokio::task::JoinHandle<()>>) {
    for producer in producers {
        if let Err(e) = producer.await {
            error!("Producer failed: {}", e);
        }
    }
}

// =============================================================================
// Sender
// =============================================================================

/// Stand-in for the beacon transport
struct SimulatedTransport {
    failure_every: u64,
    sent: u64,
    failed: u64,
}

impl SimulatedTransport {
    fn new(failure_every: u64) -> Self {
        Self {
            failure_every,
            sent: 0,
            failed: 0,
        }
    }

    fn send(&mut self, chunk: &str) -> anyhow::Result<()> {
        self.sent += 1;
        if self.failure_every > 0 && self.sent % self.failure_every == 0 {
            self.failed += 1;
            anyhow::bail!("simulated transport failure ({} bytes)", chunk.len());
        }
        Ok(())
    }
}

/// Drain every beacon once.
///
/// Each chunk gets its own drain session, so a delivered chunk is committed
/// before the next one is built. A failed send resets only the undelivered
/// records and moves on to the next beacon.
fn send_pass(cache: &BeaconCache, transport: &mut SimulatedTransport, max_chunk_size: usize) {
    for key in cache.beacon_ids() {
        let prefix = format!("sn={}&", key);
        loop {
            let mut session = match cache.begin_drain(key) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Skipping beacon: {}", e);
                    break;
                }
            };

            let chunk = session.next_chunk(&prefix, max_chunk_size, "&");
            if chunk.is_empty() {
                session.commit();
                break;
            }

            match transport.send(&chunk) {
                Ok(()) => session.commit(),
                Err(e) => {
                    debug!(beacon = key, "Send failed: {}", e);
                    session.reset();
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
