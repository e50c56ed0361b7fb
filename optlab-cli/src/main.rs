//! OptLab CLI — trade simulation and parameter search commands.
//!
//! Commands:
//! - `simulate` — replay a signal CSV against a price CSV and report the trajectory
//! - `search` — search SMA-cross parameters over a price CSV

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use optlab_core::{Objective, Simulation, Trajectory};
use optlab_runner::{
    format_vector, frame_hash, load_frame, progress_bar, search, write_trajectory, SearchConfig,
    SearchMethod, SearchProgress, SignalGenerator, SmaCross,
};

#[derive(Parser)]
#[command(
    name = "optlab",
    about = "OptLab CLI — cost-aware trade simulation and parameter search"
)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a signal matrix against prices and report the outcome.
    Simulate {
        /// Price CSV: date column followed by one column per asset.
        #[arg(long)]
        prices: PathBuf,

        /// Signal CSV with the same layout as the prices.
        #[arg(long)]
        signals: PathBuf,

        /// TOML config supplying cost, cash plan and trading options.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Expand the trajectory to every price date.
        #[arg(long, default_value_t = false)]
        full_history: bool,

        /// Write the trajectory to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Search SMA-cross parameters over a price table.
    Search {
        /// Price CSV: date column followed by one column per asset.
        #[arg(long)]
        prices: PathBuf,

        /// TOML search config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured method: exhaustive, monte_carlo or incremental.
        #[arg(long)]
        method: Option<String>,

        /// Print the outcome as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Number of ranked results to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate {
            prices,
            signals,
            config,
            full_history,
            output,
        } => run_simulate(&prices, &signals, config.as_deref(), full_history, output),
        Commands::Search {
            prices,
            config,
            method,
            json,
            top,
        } => run_search(&prices, config.as_deref(), method, json, top),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SearchConfig> {
    match path {
        Some(path) => SearchConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(SearchConfig::default()),
    }
}

fn run_simulate(
    prices_path: &Path,
    signals_path: &Path,
    config_path: Option<&Path>,
    full_history: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let prices = load_frame(prices_path)
        .with_context(|| format!("loading prices {}", prices_path.display()))?;
    let signals = load_frame(signals_path)
        .with_context(|| format!("loading signals {}", signals_path.display()))?;
    info!(
        dates = prices.n_dates(),
        assets = prices.n_columns(),
        signal_rows = signals.n_dates(),
        prices_hash = %frame_hash(&prices),
        "inputs loaded"
    );

    let cash_plan = config.build_cash_plan(&prices)?;
    let mut trajectory = Simulation::new(&prices)
        .with_cost(config.cost_model()?)
        .with_cash_plan(cash_plan)
        .with_options(config.loop_options())
        .run(&signals)
        .context("simulation failed")?;
    if full_history || config.trading.full_history {
        trajectory = trajectory.expand(&prices);
    }

    print_summary(&trajectory, config.objective.score(&trajectory));
    if let Some(path) = output {
        write_trajectory(&path, &trajectory)
            .with_context(|| format!("writing trajectory {}", path.display()))?;
        println!("Trajectory written to {}", path.display());
    }
    Ok(())
}

fn print_summary(trajectory: &Trajectory, score: f64) {
    let rows = trajectory.rows();
    let fees: f64 = rows.iter().map(|r| r.fee).sum();
    println!("=== Simulation ===");
    if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
        println!("Period:        {} to {}", first.date, last.date);
    }
    println!("Steps:         {}", rows.len());
    println!("Injected:      {:.2}", trajectory.total_injected());
    println!("Fees:          {fees:.2}");
    match trajectory.final_value() {
        Some(value) => println!("Final value:   {value:.2}"),
        None => println!("Final value:   n/a"),
    }
    println!("Score:         {score:.6}");
}

fn run_search(
    prices_path: &Path,
    config_path: Option<&Path>,
    method: Option<String>,
    json: bool,
    top: usize,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(name) = method {
        config.method = name.parse::<SearchMethod>()?;
    }

    let prices = Arc::new(
        load_frame(prices_path)
            .with_context(|| format!("loading prices {}", prices_path.display()))?,
    );
    let generator = Arc::new(SmaCross::default());
    let space = match config.space()? {
        Some(space) => {
            let expected = generator.space().dim();
            if space.dim() != expected {
                bail!(
                    "configured space has {} axes, {} expects {expected}",
                    space.dim(),
                    generator.name()
                );
            }
            space
        }
        None => generator.space(),
    };

    let evaluator = config.evaluator(generator, prices)?;

    let show_bar = !json;
    let report = |p: &SearchProgress| {
        if show_bar {
            eprintln!("round {} {}", p.round, progress_bar(p.fraction(), 40));
        }
    };
    let outcome = search(
        &config.method,
        &space,
        &evaluator,
        &config.search_options(),
        Some(&report as &dyn Fn(&SearchProgress)),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("=== Search: {} ===", config.method);
    println!("Space:        {space}");
    println!("Evaluations:  {}", outcome.evaluations);
    println!("Rounds:       {}", outcome.rounds);
    println!();
    println!("{:>4}  {:>14}  params", "rank", "score");
    for (rank, (params, score)) in outcome.ranked().into_iter().take(top).enumerate() {
        println!("{:>4}  {score:>14.6}  {}", rank + 1, format_vector(params));
    }
    Ok(())
}
