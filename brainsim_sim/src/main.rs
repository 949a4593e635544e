//! brainsim CLI
//!
//! Run batches of simulation kernels from a JSON parameter store.

use anyhow::{Context, Result};
use brainsim_core::Strategy;
use brainsim_env::{JsonFileSource, ParameterSet, ParameterStore};
use brainsim_sim::{run_worker, BatchRunner, ModelKind, RunReport};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// brainsim batch simulation CLI
#[derive(Parser, Debug)]
#[command(name = "brainsim")]
#[command(about = "Run discrete-time simulations across threads or processes", long_about = None)]
struct Cli {
    /// Verbose output (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a batch of kernels
    Run(RunArgs),

    /// Store parameters (key=value, values parsed as JSON when possible)
    Set {
        /// Path to the JSON parameter store
        #[arg(short, long)]
        config: PathBuf,

        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Print the stored parameters
    Show {
        /// Path to the JSON parameter store
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run one kernel and print its record as JSON (used by process strategies)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        model: ModelKind,

        #[arg(long, default_value = "0")]
        index: usize,

        /// Parameter set as a JSON object
        #[arg(long)]
        params: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the JSON parameter store
    #[arg(short, long)]
    config: PathBuf,

    /// Model to run (neuron, random_walk); defaults to the stored 'model' or neuron
    #[arg(short, long)]
    model: Option<ModelKind>,

    /// Execution strategy (threads, processes, thread-pool, process-pool)
    #[arg(short = 'S', long)]
    strategy: Option<Strategy>,

    /// Pool size for pooled strategies (default: core count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Number of runs (overrides the stored 'runs')
    #[arg(short, long)]
    runs: Option<usize>,

    /// Steps per run (overrides stored durations)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Base seed; run i uses seed + i (overrides the stored 'seed')
    #[arg(long)]
    seed: Option<u64>,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Write the run report to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let result = match cli.command {
        Commands::Run(args) => run_batch(args),
        Commands::Set { config, assignments } => set_parameters(config, &assignments),
        Commands::Show { config } => show_parameters(config),
        Commands::Worker { model, index, params } => run_worker(model, index, &params)
            .map(|line| {
                println!("{}", line);
                true
            })
            .map_err(Into::into),
    };

    // Exit with proper code for CI
    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout stays parseable (`--json`, `worker`).
fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;
    Ok(())
}

fn open_store(path: &Path) -> Result<ParameterStore<JsonFileSource>> {
    ParameterStore::open(JsonFileSource::new(path))
        .with_context(|| format!("Failed to open parameter store {}", path.display()))
}

fn run_batch(args: RunArgs) -> Result<bool> {
    let store = open_store(&args.config)?;

    let model = match args.model {
        Some(model) => model,
        None => store
            .get("model", ModelKind::Neuron.name().to_string())
            .parse::<ModelKind>()
            .map_err(anyhow::Error::msg)?,
    };

    let mut runner = BatchRunner::from_store(&store, model);
    if let Some(strategy) = args.strategy {
        runner = runner.with_strategy(strategy);
    }
    if let Some(workers) = args.workers {
        runner = runner.with_workers(workers);
    }
    if let Some(runs) = args.runs {
        runner = runner.with_runs(runs);
    }
    if let Some(duration) = args.duration {
        runner = runner.with_duration(duration);
    }
    if let Some(seed) = args.seed {
        runner = runner.with_seed(seed);
    }

    if !args.json {
        info!("brainsim v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
    debug!("Parameters: {:?}", store.parameters());

    let report = runner.run()?;

    if let Some(path) = &args.export {
        report
            .write_to_file(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Exported report to {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        log_summary(&report);
    }

    Ok(report.is_success())
}

fn log_summary(report: &RunReport) {
    for run in &report.runs {
        if run.passed() {
            info!(
                "✓ run {} (seed={}) {} after {} steps",
                run.index, run.seed, run.state, run.current_time
            );
        } else {
            error!(
                "✗ run {} (seed={}) {}: {}",
                run.index,
                run.seed,
                run.state,
                run.error.as_deref().unwrap_or("unknown")
            );
        }
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if report.is_success() {
        info!(
            "✅ All {} runs completed with {} in {:.1} ms",
            report.total, report.strategy, report.elapsed_ms
        );
    } else {
        error!("❌ {}/{} runs failed!", report.failed, report.total);
    }
}

fn set_parameters(config: PathBuf, assignments: &[String]) -> Result<bool> {
    let mut store = open_store(&config)?;
    let updates = assignments
        .iter()
        .map(|a| ParameterSet::parse_assignment(a))
        .collect::<Result<Vec<_>, _>>()?;

    let count = updates.len();
    store.update(updates)?;
    info!("Stored {} parameter(s) in {}", count, config.display());
    Ok(true)
}

fn show_parameters(config: PathBuf) -> Result<bool> {
    let store = open_store(&config)?;
    println!("{}", serde_json::to_string_pretty(store.parameters())?);
    Ok(true)
}
