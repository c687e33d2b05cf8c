//! Tremor Rollout Simulation
//!
//! Runs one closed-loop rollout for a sampled patient and prints the
//! sensor-rate IMU trace.
//!
//! # Usage
//! ```bash
//! ./simulation --matrix "1.5;130;6e-5;0" --duration 10 --format csv > trace.csv
//! ./simulation --matrix "1.5,0.5;130,90;6e-5,6e-5;0,1" --format json --quiet
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use stimtune::cohort::sample_patient;
use stimtune::config::TunerConfig;
use stimtune::simulation::Simulator;
use stimtune::types::{parse_param_matrix, MeasurementOutput, StimParams};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Closed-loop tremor rollout for one stimulation setting")]
#[command(version = "1.0")]
struct Args {
    /// Parameter matrix: amp;freq_hz;pulse_width_s;phase_rad, channels comma separated
    #[arg(short, long, default_value = "1.5;130;6e-5;0")]
    matrix: String,

    /// Rollout duration in seconds (default: rollout.duration_s)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Output format: json or csv
    #[arg(short, long, default_value = "csv")]
    format: String,

    /// Seed for patient sampling and sensor noise (default: config seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Disable sensor noise
    #[arg(long)]
    no_noise: bool,

    /// Tuner config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress the run log (only output sensor data)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Output
// ============================================================================

fn log_run(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[sim] {message}");
    }
}

fn write_csv(out: &mut impl Write, trace: &MeasurementOutput) -> io::Result<()> {
    writeln!(out, "t,pos_x,pos_y,pos_z,vel_x,vel_y,vel_z,acc_x,acc_y,acc_z")?;
    for (t, row) in trace.t.iter().zip(trace.to_nine_channel()) {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:.9e}")).collect();
        writeln!(out, "{t:.6},{}", cells.join(","))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => TunerConfig::load_from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => TunerConfig::load(),
    };

    let rows = parse_param_matrix(&args.matrix)?;
    let params = StimParams::from_matrix(&rows)?;
    let seed = args.seed.unwrap_or(config.seed);

    let mut rollout = config.rollout_config();
    if let Some(d) = args.duration {
        rollout = rollout.with_duration(d);
    }
    if args.no_noise {
        rollout.include_noise = false;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let patient = sample_patient(&mut rng, config.cohort.treatment_goals.as_ref());
    let simulator = Simulator::from_config(&config);

    log_run(&format!("Channels: {}", params.n_channels()), args.quiet);
    log_run(&format!("Duration: {:.2} s at dt {:.4} s", rollout.duration_s, rollout.dt), args.quiet);
    log_run(&format!("Sensor rate: {:.0} Hz", rollout.sample_rate_hz), args.quiet);
    log_run(&format!("Seed: {seed}"), args.quiet);

    let started = Instant::now();
    let trace = simulator.simulate(&params, &patient, &rollout, seed)?;
    log_run(
        &format!(
            "{} samples in {:.1} ms, acc RMS {:.4e}",
            trace.len(),
            started.elapsed().as_secs_f64() * 1e3,
            trace.acc_magnitude_rms()
        ),
        args.quiet,
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match args.format.as_str() {
        "json" => {
            serde_json::to_writer(&mut out, &trace)?;
            writeln!(out)?;
        }
        "csv" => write_csv(&mut out, &trace)?,
        other => anyhow::bail!("unknown format '{other}' (expected csv or json)"),
    }
    out.flush()?;
    Ok(())
}
