//! Closed-loop Tuning
//!
//! Repeatedly suggests a batch, scores it on the simulated patient and
//! appends the results to a history CSV, which is rewritten after every
//! iteration so an interrupted run keeps its progress.
//!
//! # Usage
//! ```bash
//! ./tune-loop --history patient_7.csv --iterations 10 --batch-size 3
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use stimtune::config::{self, TunerConfig};
use stimtune::history::{read_history, write_history};
use stimtune::severity::SeverityEvaluator;
use stimtune::tuning::{run_tuning_with, seed_history};
use stimtune::types::HistoryTable;

#[derive(Parser, Debug)]
#[command(name = "tune-loop")]
#[command(about = "Run suggest/evaluate iterations and persist the history CSV")]
#[command(version = "1.0")]
struct Args {
    /// History CSV, created if missing
    #[arg(long, value_name = "FILE")]
    history: PathBuf,

    /// Iterations (default: tuning.iterations)
    #[arg(long)]
    iterations: Option<usize>,

    /// Candidates evaluated per iteration (default: tuning.batch_size)
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    exploration_weight: Option<f64>,

    #[arg(long)]
    min_distance_frac: Option<f64>,

    /// Random rows scored first when the history is empty
    #[arg(long, default_value = "3")]
    initial_samples: usize,

    /// Channels for the initial rows
    #[arg(long, default_value = "1")]
    channels: usize,

    /// Evaluate candidates one at a time
    #[arg(long)]
    sequential: bool,

    /// Tuner config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => TunerConfig::load_from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => TunerConfig::load(),
    };
    if let Some(n) = args.iterations {
        cfg.tuning.iterations = n;
    }
    if let Some(k) = args.batch_size {
        cfg.tuning.batch_size = k;
    }
    if let Some(w) = args.exploration_weight {
        cfg.optimizer.exploration_weight = w;
    }
    if let Some(d) = args.min_distance_frac {
        cfg.optimizer.min_distance_frac = d;
    }
    if args.sequential {
        cfg.tuning.parallel = false;
    }
    config::init(cfg);
    let cfg = config::get();

    let evaluator = SeverityEvaluator::from_config(cfg)?;

    let mut history = if args.history.exists() {
        read_history(&args.history).with_context(|| format!("reading {}", args.history.display()))?
    } else {
        HistoryTable::new(Vec::new())
    };
    if history.is_empty() {
        info!(samples = args.initial_samples, channels = args.channels, "Empty history, seeding");
        seed_history(&mut history, &evaluator, args.initial_samples, args.channels, cfg.seed)?;
        write_history(&history, &args.history)?;
    }

    let path = args.history.clone();
    let report = run_tuning_with(&mut history, &evaluator, cfg, |iteration, table| {
        write_history(table, &path)?;
        info!(iteration, rows = table.len(), path = %path.display(), "History saved");
        Ok(())
    })?;

    for e in &report.evaluations {
        println!(
            "iteration={}/{} candidate={} severity={:.6}",
            e.iteration, cfg.tuning.iterations, e.candidate, e.severity
        );
    }
    if let Some(best) = &report.best {
        println!(
            "best severity={:.6} params={}",
            best.severity.unwrap_or(f64::NAN),
            serde_json::to_string(&best.params)?
        );
    }
    Ok(())
}
