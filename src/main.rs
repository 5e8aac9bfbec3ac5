//! Command-line runner: reads a JSON operation tree, evaluates it, writes the
//! result (or the error) as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, anyhow};
use clap::Parser;
use lae::{ExecutorConfig, LinearAlgebraEngine, io};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lae", version, about = "Evaluate a matrix operation tree on a fatigue-weighted thread pool")]
struct Args {
    /// Number of worker threads
    threads: usize,
    /// JSON file holding the operation tree
    input: PathBuf,
    /// Where to write the JSON result
    output: PathBuf,
    /// Seed for the workers' fatigue multipliers
    #[arg(long)]
    seed: Option<u64>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(args: &Args) -> anyhow::Result<String> {
    let tree = io::read_tree(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut config = ExecutorConfig::new(args.threads);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    let engine = LinearAlgebraEngine::with_config(config)?;

    info!(threads = args.threads, "starting execution");
    let started = Instant::now();
    let resolved = engine.run(tree)?;
    let rows = resolved
        .matrix_value()
        .ok_or_else(|| anyhow!("tree did not collapse to a matrix"))?;

    io::write_result(&args.output, rows)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "computation finished"
    );
    Ok(engine.worker_report())
}

/// Logs the full error chain and writes it to the output file.
fn report_failure(output: &Path, err: &anyhow::Error) {
    let message = format!("{err:#}");
    error!("{message}");
    if let Err(write_err) = io::write_error(output, &message) {
        error!(error = %write_err, "failed to write error to output file");
    }
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(&args) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_failure(&args.output, &err);
            ExitCode::FAILURE
        }
    }
}
