//! Chronosim scenario runner.
//!
//! # Usage
//!
//! ```bash
//! # Three peers, random seed, one publish chain each
//! chronosim --nodes 3
//!
//! # Replay a run with periodic chains and 5% datagram loss
//! chronosim --seed 1234 --periodic --fail-rate 0.05 --duration-secs 120
//! ```

use std::time::Duration;

use chronosim_core::Name;
use chronosim_driver::{DriverConfig, UniformRange};
use chronosim_harness::{Scenario, ScenarioConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ChronoSync scenario simulator
#[derive(Parser, Debug)]
#[command(name = "chronosim")]
#[command(about = "Run a seeded multi-peer ChronoSync publish/fetch scenario")]
#[command(version)]
struct Args {
    /// Number of simulated peers
    #[arg(short, long, default_value = "3")]
    nodes: usize,

    /// Simulation seed (random if omitted)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Smallest message budget a peer may draw
    #[arg(long, default_value = "1")]
    min_messages: u64,

    /// Largest message budget a peer may draw
    #[arg(long, default_value = "10")]
    max_messages: u64,

    /// Start a new publish chain every delay instead of just one
    #[arg(long)]
    periodic: bool,

    /// Virtual seconds to run
    #[arg(long, default_value = "60")]
    duration_secs: u64,

    /// Sync group prefix
    #[arg(long, default_value = "/ndn/broadcast/sync")]
    sync_prefix: Name,

    /// Routing prefix placed before each peer's user prefix
    #[arg(long, default_value = "/ndn")]
    routing_prefix: Name,

    /// Probability of dropping a datagram
    #[arg(long, default_value = "0.0")]
    fail_rate: f64,

    /// Cap on outstanding fetches per peer (unbounded if omitted)
    #[arg(long)]
    max_outstanding_fetches: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn random_seed() -> Result<u64, String> {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).map_err(|e| format!("failed to draw a seed: {e}"))?;
    Ok(u64::from_le_bytes(buf))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let seed = match args.seed {
        Some(seed) => seed,
        None => random_seed()?,
    };
    tracing::info!("Chronosim starting with seed {seed} (pass --seed {seed} to replay)");

    let config = ScenarioConfig {
        nodes: args.nodes,
        seed,
        sync_prefix: args.sync_prefix,
        routing_prefix: args.routing_prefix,
        driver: DriverConfig {
            messages: UniformRange::new(args.min_messages, args.max_messages),
            max_outstanding_fetches: args.max_outstanding_fetches,
            ..Default::default()
        },
        periodic: args.periodic,
        duration: Duration::from_secs(args.duration_secs),
        fail_rate: args.fail_rate,
        ..Default::default()
    };

    let report = Scenario::with_config(config).run()?;

    for node in &report.nodes {
        tracing::info!(
            host = %node.host,
            budget = node.message_budget,
            published = node.published.len(),
            received = node.received.len(),
            fetch_failures = node.stats.fetch_failures,
            "peer summary"
        );
        for record in &node.received {
            tracing::debug!(host = %node.host, at = ?record.at, "{}: {}", record.peer, record.content);
        }
    }

    tracing::info!(
        "Published {} packets, delivered {}, {} fetch failures",
        report.total_published(),
        report.total_received(),
        report.total_fetch_failures()
    );

    Ok(())
}
