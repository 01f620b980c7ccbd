//! ParlayPool Simulator
//!
//! Drives the round accounting engine through full rounds against an
//! in-memory ledger, oracle and clock.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parlaypool_engine::PoolConfig;

mod controller;
mod metrics;
mod participant;
mod scenario;

use controller::{SimulationController, SimulationSettings};
use scenario::Scenario;

/// ParlayPool Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "ParlayPool round accounting simulation environment")]
struct Args {
    /// Number of simulated depositors
    #[arg(short, long, default_value = "5")]
    depositors: usize,

    /// Rounds to close in a randomized run
    #[arg(short, long, default_value = "4")]
    rounds: usize,

    /// Tickets submitted per round
    #[arg(short, long, default_value = "20")]
    tickets: usize,

    /// Decimal precision of the simulated collateral
    #[arg(long, default_value = "6", value_parser = clap::value_parser!(u32).range(0..=24))]
    decimals: u32,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Named scenario to run instead of random rounds
    #[arg(short, long)]
    scenario: Option<String>,

    /// JSON logs, and the final report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr; stdout carries the report.
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if args.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = PoolConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!("Starting ParlayPool Simulator");
    info!("Depositors: {}", args.depositors);
    info!("Collateral decimals: {}", args.decimals);

    let settings = SimulationSettings {
        depositors: args.depositors,
        rounds: args.rounds,
        tickets: args.tickets,
        decimals: args.decimals,
        seed: args.seed,
    };
    let mut controller = SimulationController::new(settings, config)?;
    controller.initialize()?;

    if let Some(scenario_name) = &args.scenario {
        info!("Running scenario: {}", scenario_name);

        let scenario = Scenario::load(scenario_name)?;
        controller.run_scenario(scenario).await?;
    } else {
        controller.run().await?;
    }

    let metrics = controller.get_metrics();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
        return Ok(());
    }

    info!("Simulation complete");
    info!("Rounds closed: {}", metrics.rounds_closed());
    info!(
        "Trades: {} accepted, {} rejected ({:.1}% accepted)",
        metrics.trades_accepted,
        metrics.trades_rejected,
        metrics.acceptance_rate() * 100.0
    );
    info!(
        "Routed to round 1: {:.1}%",
        metrics.default_round_share() * 100.0
    );
    info!("Tickets exercised: {}", metrics.tickets_exercised);
    info!("Safe box total: {}", metrics.safe_box_total);
    for round in &metrics.rounds {
        info!(
            "Round {}: pnl {} cumulative {} allocation {}",
            round.round, round.pnl, round.cumulative_pnl, round.allocation
        );
    }
    for (user, change, gained) in controller.depositor_returns()? {
        let sign = if gained { "+" } else { "-" };
        info!("Wallet {}: {}{}", user, sign, change);
    }

    Ok(())
}
