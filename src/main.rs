//! stimtune - closed-loop stimulation parameter tuning
//!
//! # Usage
//!
//! ```bash
//! # Next parameters from a history CSV (JSON on stdout)
//! stimtune suggest --history patient_7.csv --batch-size 3
//!
//! # Severity of one 4 x N parameter matrix (rows separated by ';')
//! stimtune evaluate --matrix "1.5,0.5;130,90;6e-5,6e-5;0,1"
//!
//! # Check a config file
//! stimtune validate-config stimtune.toml
//! ```
//!
//! # Environment Variables
//!
//! - `STIMTUNE_CONFIG`: Path to the tuner config (default: ./stimtune.toml)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use stimtune::config::{self, validation, ConfigError, TunerConfig};
use stimtune::history::read_history;
use stimtune::optimizer::suggest_table;
use stimtune::severity::SeverityEvaluator;
use stimtune::types::{parse_param_matrix, PatientContext};

#[derive(Parser, Debug)]
#[command(name = "stimtune")]
#[command(about = "Closed-loop stimulation parameter tuning")]
#[command(version)]
struct CliArgs {
    /// Tuner config file (overrides STIMTUNE_CONFIG and ./stimtune.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Suggest the next stimulation parameters from a history CSV
    Suggest {
        #[arg(long, value_name = "FILE")]
        history: PathBuf,
        /// Candidates to return (default: optimizer.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Score one parameter matrix
    Evaluate {
        /// Rows amp;freq_hz;pulse_width_s;phase_rad, channels comma separated
        #[arg(long)]
        matrix: String,
        /// Patient context JSON for the composite backend
        #[arg(long, value_name = "FILE")]
        context: Option<PathBuf>,
    },
    /// Parse and validate a config file
    ValidateConfig { file: PathBuf },
}

fn load_config(path: Option<&PathBuf>) -> Result<TunerConfig> {
    match path {
        Some(p) => TunerConfig::load_from_file(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(TunerConfig::load()),
    }
}

fn validate_config(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let warnings = validation::validate_unknown_keys(&raw);
    for w in &warnings {
        println!("warning: {w}");
    }
    let config: TunerConfig = toml::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
    let (_, range_warnings) = validation::validate_physical_ranges(&config);
    for w in &range_warnings {
        println!("warning: {w}");
    }
    match config.validate() {
        Ok(()) => {
            println!(
                "{}: ok ({} warning(s))",
                file.display(),
                warnings.len() + range_warnings.len()
            );
            Ok(())
        }
        Err(ConfigError::Validation(errors)) => {
            for e in &errors {
                println!("error: {e}");
            }
            bail!("{}: {} error(s)", file.display(), errors.len())
        }
        Err(e) => Err(e.into()),
    }
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

    let args = CliArgs::parse();

    if let SubCommand::ValidateConfig { file } = &args.command {
        return validate_config(file);
    }

    config::init(load_config(args.config.as_ref())?);
    let cfg = config::get();

    match args.command {
        SubCommand::Suggest { history, batch_size } => {
            let table = read_history(&history).with_context(|| format!("reading {}", history.display()))?;
            let mut optimizer = cfg.optimizer.clone();
            if let Some(k) = batch_size {
                optimizer.batch_size = k.max(1);
            }
            let result = suggest_table(&table, &optimizer)?;
            info!(source = ?result.source, batch = result.next_params_batch.len(), "Suggestion ready");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        SubCommand::Evaluate { matrix, context } => {
            let rows = parse_param_matrix(&matrix)?;
            let context: Option<PatientContext> = match context {
                Some(path) => {
                    let text =
                        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                    Some(serde_json::from_str(&text).context("parsing patient context")?)
                }
                None => None,
            };
            let evaluator = SeverityEvaluator::from_config(cfg)?;
            let severity = evaluator.evaluate_matrix(&rows, context.as_ref())?;
            println!("{severity:.6}");
        }
        SubCommand::ValidateConfig { .. } => {}
    }

    Ok(())
}
