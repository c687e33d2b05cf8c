//! System-wide default constants.
//!
//! Every `Default` impl in the config module reads from here, so a run with no
//! `stimtune.toml` reproduces the nominal simulator and optimizer exactly.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Rollout
// ============================================================================

/// Integration step (seconds). 1 ms resolves 200 Hz pulse trains.
pub const DEFAULT_DT_S: f64 = 1e-3;

/// Default rollout length for ad-hoc simulation (seconds).
pub const DEFAULT_DURATION_S: f64 = 10.0;

/// Sensor output rate (Hz).
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 100.0;

pub const DEFAULT_SCHEMA_VERSION: &str = "sim.v1";

/// Seed for the evaluation patient and simulation noise.
pub const DEFAULT_SEED: u64 = 7;

/// Simulations whose position leaves this bound are rejected as unstable.
pub const ENERGY_BOUND: f64 = 1e4;

// ============================================================================
// Neural drive oscillator
// ============================================================================

pub const DRIVE_NATURAL_FREQ_HZ: f64 = 5.0;
pub const DRIVE_DAMPING: f64 = 0.15;
pub const DRIVE_COUPLING: f64 = 0.8;

/// Extra velocity damping per unit of stimulation RMS.
pub const DRIVE_INHIBITION: f64 = 80.0;

/// Spontaneous drive noise (position * rad/s^0.5).
pub const DRIVE_NOISE_STD: f64 = 10.0;

/// Step used when the time grid has a single point.
pub const DRIVE_DT_HINT_S: f64 = 1e-3;

/// Time constant of the stimulation mean-square tracker (seconds).
pub const DRIVE_RMS_TAU_S: f64 = 0.020;

/// Band-power proxy window (seconds), never fewer than 2 samples.
pub const BAND_POWER_WINDOW_S: f64 = 0.25;

// ============================================================================
// Peripheral transducer
// ============================================================================

pub const TRANSDUCER_FREQ_HZ: f64 = 4.5;
pub const TRANSDUCER_DAMPING: f64 = 0.7;
pub const TRANSDUCER_GAIN: f64 = 1.0;

/// Drive-to-axis weights (X, Y, Z).
pub const TRANSDUCER_MIX: [f64; 3] = [1.0, 0.6, 0.3];

/// Weight for axes missing from a short mix vector.
pub const TRANSDUCER_MIX_PAD: f64 = 0.1;

/// Damping ratios below this are raised to it.
pub const TRANSDUCER_DAMPING_FLOOR: f64 = 1e-4;

// ============================================================================
// Sensor
// ============================================================================

pub const SENSOR_NOISE_STD: f64 = 0.02;
pub const SENSOR_BIAS_STD: f64 = 0.01;
pub const SENSOR_DRIFT_PER_S: f64 = 0.001;

// ============================================================================
// Severity
// ============================================================================

/// Rollout length used when scoring a parameter set (seconds). 300 = 5 min.
pub const SEVERITY_ROLLOUT_DURATION_S: f64 = 300.0;

/// Regression window length (sensor samples).
pub const SEVERITY_WINDOW: usize = 256;

/// Regression window hop (sensor samples).
pub const SEVERITY_STRIDE: usize = 128;

/// Baseline RMS floor for the analytical suppression ratio.
pub const BASELINE_RMS_FLOOR: f64 = 1e-12;

/// Channel-norm std below this is replaced by 1.
pub const CHANNEL_STD_FLOOR: f64 = 1e-6;

/// Floor on the composite weight total.
pub const COMPOSITE_WEIGHT_FLOOR: f64 = 1e-6;

/// Disease duration normalisation (years).
pub const DURATION_MU_YEARS: f64 = 0.0;
pub const DURATION_SIGMA_YEARS: f64 = 1.0;

// ============================================================================
// Optimizer
// ============================================================================

/// Most recent history rows used per suggestion.
pub const HISTORY_WINDOW: usize = 50;

pub const N_CANDIDATES: usize = 5_000;
pub const RANDOM_STATE: u64 = 0;
pub const BATCH_SIZE: usize = 1;
pub const EXPLORATION_WEIGHT: f64 = 0.2;
pub const MIN_DISTANCE_FRAC: f64 = 0.05;
pub const BOUNDS_EXPANSION: f64 = 0.1;
pub const FALLBACK_MIN_SAMPLES: usize = 3;

/// Half-width of the search interval around a constant column.
pub const MIN_SPAN_AMP: f64 = 0.2;
pub const MIN_SPAN_FREQ_HZ: f64 = 10.0;
pub const MIN_SPAN_PULSE_WIDTH_S: f64 = 0.5;
pub const MIN_SPAN_PHASE_RAD: f64 = 0.5;

/// Bound ranges at or below this are treated as unit range when normalising.
pub const DEGENERATE_RANGE_EPS: f64 = 1e-12;

// ============================================================================
// Gaussian process surrogate
// ============================================================================

pub const GP_SIGNAL_VARIANCE_BOUNDS: (f64, f64) = (1e-2, 1e2);
pub const GP_LENGTH_SCALE_BOUNDS: (f64, f64) = (1e-2, 1e2);
pub const GP_NOISE_BOUNDS: (f64, f64) = (1e-6, 1.0);

/// Diagonal jitter added to every kernel matrix.
pub const GP_JITTER: f64 = 1e-6;

/// Initial (signal variance, length scale, noise).
pub const GP_INITIAL: (f64, f64, f64) = (1.0, 1.0, 1e-3);

/// Fixed hyperparameters for the stabilized refit.
pub const GP_STABILIZED: (f64, f64, f64) = (1.0, 1.0, 1e-2);

/// Extra optimizer starts from random log-uniform points.
pub const GP_RESTARTS: usize = 1;

pub const GP_MAX_ITERATIONS: usize = 200;

/// Convergence tolerance on the projected log-space gradient.
pub const GP_GRADIENT_TOL: f64 = 1e-5;

// ============================================================================
// Closed-loop tuning
// ============================================================================

pub const TUNING_ITERATIONS: usize = 10;
pub const TUNING_BATCH_SIZE: usize = 3;

// ============================================================================
// Monte-Carlo sweep
// ============================================================================

pub const SWEEP_SAMPLES: usize = 30;
pub const SWEEP_CHANNELS: usize = 4;
pub const SWEEP_SEED: u64 = 42;
pub const SWEEP_HISTOGRAM_BINS: usize = 16;
