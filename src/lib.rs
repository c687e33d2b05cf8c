//! stimtune: closed-loop stimulation parameter tuning
//!
//! A deterministic tremor simulator scored by a severity evaluator and driven
//! by a Gaussian-process Bayesian optimizer.
//!
//! ## Architecture
//!
//! - **Simulation**: waveform encoder, neural drive model, peripheral
//!   transducer and IMU sensor chained into one rollout
//! - **Cohort**: synthetic patient sampler
//! - **Severity**: analytical, regression and composite scoring backends
//! - **Optimizer**: GP surrogate, expected improvement, diverse batch selection
//! - **Tuning**: suggest/evaluate loop over a persisted history

pub mod cohort;
pub mod config;
pub mod error;
pub mod history;
pub mod optimizer;
pub mod severity;
pub mod simulation;
pub mod tuning;
pub mod types;

// Re-export configuration
pub use config::TunerConfig;

// Re-export errors
pub use error::{CoreError, CoreResult};

// Re-export commonly used types
pub use types::{
    HistoryTable, MeasurementOutput, ObservationRecord, OptimizerResult, PatientContext, PatientParams,
    RolloutConfig, StimParams, TreatmentGoals,
};

// Re-export the main entry points
pub use optimizer::{suggest, suggest_table};
pub use severity::SeverityEvaluator;
pub use simulation::Simulator;
pub use tuning::{run_tuning, TuningReport};
