//! Severity Response Sweep
//!
//! Draws random parameter matrices within the documented bounds, scores each
//! one and prints the distribution of severities.
//!
//! # Usage
//! ```bash
//! ./severity-sweep --samples 200 --channels 2 --duration 30
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use stimtune::config::TunerConfig;
use stimtune::severity::sweep::ascii_histogram;
use stimtune::severity::{run_sweep, SeverityEvaluator, SweepSettings};

#[derive(Parser, Debug)]
#[command(name = "severity-sweep")]
#[command(about = "Monte-Carlo sweep of the severity response")]
#[command(version = "1.0")]
struct Args {
    #[arg(short = 'n', long, default_value = "100")]
    samples: usize,

    #[arg(short, long, default_value = "1")]
    channels: usize,

    /// Seed for the parameter draws
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Score every draw on a different patient
    #[arg(long)]
    vary_patient: bool,

    /// Evaluation rollout duration in seconds (default: severity.rollout_duration_s)
    #[arg(short, long)]
    duration: Option<f64>,

    #[arg(long, default_value = "20")]
    bins: usize,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    json: bool,

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
    let config = match &args.config {
        Some(path) => TunerConfig::load_from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => TunerConfig::load(),
    };

    let mut evaluator = SeverityEvaluator::from_config(&config)?;
    if let Some(d) = args.duration {
        evaluator = evaluator.with_rollout_duration(d);
    }

    let report = run_sweep(
        &evaluator,
        SweepSettings {
            samples: args.samples,
            channels: args.channels,
            seed: args.seed,
            vary_patient: args.vary_patient,
        },
    )?;

    let Some(stats) = report.summary() else {
        anyhow::bail!("no successful samples ({} failures)", report.failures.len());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Severity sweep: {} samples, {} channel(s)", stats.count, args.channels);
    if !report.failures.is_empty() {
        println!("Failures: {}", report.failures.len());
    }
    println!("Min:    {:+.6}", stats.min);
    println!("Max:    {:+.6}", stats.max);
    println!("Range:  {:.6}", stats.range());
    println!("Mean:   {:+.6}", stats.mean);
    println!("Std:    {:.6}", stats.std);
    println!("Median: {:+.6}", stats.median);
    println!("p5:     {:+.6}", stats.p5);
    println!("p95:    {:+.6}", stats.p95);
    println!("p25:    {:+.6}", stats.p25);
    println!("p75:    {:+.6}", stats.p75);
    println!();
    println!("Histogram:");
    print!("{}", ascii_histogram(&report.values, args.bins.max(1), 50));
    Ok(())
}
