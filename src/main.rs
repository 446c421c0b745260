use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tax_balancing::config::{PortfolioConfig, RebalanceType};
use tax_balancing::prices::{load_price_series, FilePriceProvider};
use tax_balancing::rebalance::RebalancingEngine;
use tax_balancing::report::ConsoleReporter;
use tax_balancing::simulation::{SimulationContext, SimulationLoop};

/// Replay a target-allocation portfolio over historical prices, net of rebalancing tax
#[derive(Parser)]
#[command(name = "tax_balancing")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tax-aware threshold rebalancing simulator", long_about = None)]
struct Cli {
    /// Portfolio configuration (JSON)
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Directory holding one <ASSET>.csv or <ASSET>.parquet per asset
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Write the per-step history to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Never rebalance (buy-and-hold baseline)
    #[arg(long)]
    no_rebalance: bool,

    /// Only print the final summary
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging and print final weights
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = PortfolioConfig::from_path(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let names = config.asset_names();
    let provider = Arc::new(FilePriceProvider::new(&cli.data_dir));
    let start_time = Instant::now();
    let series = load_price_series(provider, &names).await;
    log::info!("Loaded price data for {} assets in {:?}", names.len(), start_time.elapsed());

    let mut context = SimulationContext::from_config(&config, series)?;
    if cli.no_rebalance {
        context.engine = RebalancingEngine::new(RebalanceType::None);
    }

    let mut reporter = ConsoleReporter::new(cli.quiet);
    let mut simulation = SimulationLoop::new(context);
    let summary = simulation.run(&mut reporter)?;
    reporter.print_summary(&summary);

    if cli.verbose {
        println!(
            "actual weights: {:#?}",
            simulation.context().portfolio.get_actual_weights()?
        );
    }

    if let Some(path) = cli.output {
        summary
            .history
            .write_csv(&path)
            .with_context(|| format!("failed to write history to {}", path.display()))?;
        println!("{} History written to {}", "✓".green().bold(), path.display());
    }

    Ok(())
}
