//! SwarmGrid CLI.
//!
//! Drives a full coordination run over a map file and reports the metrics.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use swarmgrid_env::NetworkParams;
use swarmgrid_sim::{FileMapLoader, NetSim, Simulation, SimulationConfig};

/// Multi-agent pathfinding with simulated communication.
#[derive(Parser, Debug)]
#[command(name = "swarmgrid")]
#[command(about = "Grid swarm coordinator over a lossy broadcast network", long_about = None)]
struct Args {
    /// Path to map file
    #[arg(short, long)]
    map: PathBuf,

    /// Number of agents
    #[arg(short = 'n', long, default_value_t = 8)]
    agents: usize,

    /// Random seed
    #[arg(short, long, default_value_t = 1337)]
    seed: u64,

    /// Message drop probability [0-1]
    #[arg(short, long, default_value_t = 0.05)]
    drop: f64,

    /// Mean network latency (ms)
    #[arg(short, long, default_value_t = 40)]
    latency: u32,

    /// Network jitter (ms)
    #[arg(short, long, default_value_t = 10)]
    jitter: u32,

    /// Maximum simulation steps
    #[arg(long, default_value_t = 300)]
    max_steps: u64,

    /// Output trace CSV file
    #[arg(long)]
    out_trace: Option<PathBuf>,

    /// Output metrics JSON file
    #[arg(long)]
    out_metrics: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress info messages
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set tracing subscriber");

    if !args.map.exists() {
        error!("map file does not exist: {}", args.map.display());
        return ExitCode::FAILURE;
    }
    if args.agents == 0 {
        error!("number of agents must be positive");
        return ExitCode::FAILURE;
    }
    if !(0.0..=1.0).contains(&args.drop) {
        error!("drop probability must be between 0 and 1");
        return ExitCode::FAILURE;
    }

    let network_params = NetworkParams {
        drop_probability: args.drop,
        mean_latency_ms: args.latency,
        jitter_ms: args.jitter,
    };
    let config = SimulationConfig {
        map_path: args.map,
        world: None,
        num_agents: args.agents,
        seed: args.seed,
        network_params,
        max_ticks: args.max_steps,
        trace_output: args.out_trace,
        metrics_output: args.out_metrics,
        verbose: args.verbose,
    };

    info!(
        "starting swarmgrid with {} agents, seed {}",
        config.num_agents, config.seed
    );
    info!(
        "network: drop={:.2}, latency={}ms, jitter={}ms",
        network_params.drop_probability, network_params.mean_latency_ms, network_params.jitter_ms
    );

    let map_loader = Box::new(FileMapLoader::new());
    let network = Box::new(NetSim::new(network_params, config.seed));
    let mut sim = Simulation::new(config, map_loader, network);

    if let Err(err) = sim.initialize() {
        error!("failed to initialize simulation: {err}");
        return ExitCode::FAILURE;
    }

    let metrics = match sim.run() {
        Ok(metrics) => metrics,
        Err(err) => {
            error!("simulation failed: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    info!("=== Simulation Results ===");
    info!("makespan: {} ticks", metrics.makespan);
    info!("total messages: {}", metrics.total_messages);
    info!(
        "dropped messages: {} ({:.2}%)",
        metrics.dropped_messages,
        metrics.drop_rate * 100.0
    );
    info!("total replans: {}", metrics.total_replans);
    info!(
        "collisions: {}",
        if metrics.collision_detected { "YES" } else { "NO" }
    );
    info!("wall time: {}ms", metrics.wall_time_ms);

    if metrics.collision_detected {
        error!("collision detected - run failed safety check");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
