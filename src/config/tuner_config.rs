//! Tuner Configuration - simulator, severity and optimizer settings as TOML
//!
//! Each section implements `Default` with the constants in
//! [`super::defaults`], so a missing or partial file always yields a
//! complete, valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults as d;
use crate::types::{ParamBase, RolloutConfig, TreatmentGoals};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `TunerConfig::load()` which searches:
/// 1. `$STIMTUNE_CONFIG` env var
/// 2. `./stimtune.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Seed for the evaluation patient and simulation noise
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Schema tag stamped into measurement metadata
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub rollout: RolloutSection,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub transducer: TransducerConfig,

    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub cohort: CohortConfig,

    #[serde(default)]
    pub severity: SeverityConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub tuning: TuningConfig,
}

fn default_seed() -> u64 {
    d::DEFAULT_SEED
}

fn default_schema_version() -> String {
    d::DEFAULT_SCHEMA_VERSION.to_string()
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            schema_version: default_schema_version(),
            rollout: RolloutSection::default(),
            encoder: EncoderConfig::default(),
            drive: DriveConfig::default(),
            transducer: TransducerConfig::default(),
            sensor: SensorConfig::default(),
            cohort: CohortConfig::default(),
            severity: SeverityConfig::default(),
            optimizer: OptimizerConfig::default(),
            tuning: TuningConfig::default(),
        }
    }
}

const ENV_VAR: &str = "STIMTUNE_CONFIG";
const LOCAL_FILE: &str = "stimtune.toml";

impl TunerConfig {
    /// Load configuration using the standard search order:
    /// 1. `$STIMTUNE_CONFIG` environment variable
    /// 2. `./stimtune.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), seed = config.seed, "Loaded tuner config from STIMTUNE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from STIMTUNE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "STIMTUNE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(seed = config.seed, "Loaded tuner config from ./stimtune.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./stimtune.toml, using defaults");
                }
            }
        }

        info!("No stimtune.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in &super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Tuner config saved");
        Ok(())
    }

    /// Rollout settings with the configured schema tag.
    pub fn rollout_config(&self) -> RolloutConfig {
        RolloutConfig {
            dt: self.rollout.dt,
            duration_s: self.rollout.duration_s,
            sample_rate_hz: self.rollout.sample_rate_hz,
            include_noise: self.rollout.include_noise,
            schema_version: self.schema_version.clone(),
        }
    }

    /// Validate every section for physical consistency.
    ///
    /// Rules:
    /// - Time step positive, duration at least one step
    /// - Sensor rate no faster than the integration rate
    /// - Treatment goals non-negative and summing to 1
    /// - Explicit bounds ordered low < high
    /// - Counts (batch size, candidates, min samples, window) > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let r = &self.rollout;
        if r.dt <= 0.0 {
            errors.push(format!("rollout.dt ({}) must be > 0", r.dt));
        } else {
            if r.duration_s < r.dt {
                errors.push(format!(
                    "rollout.duration_s ({}) must be >= rollout.dt ({})",
                    r.duration_s, r.dt
                ));
            }
            if r.sample_rate_hz > 1.0 / r.dt + 1e-9 {
                errors.push(format!(
                    "rollout.sample_rate_hz ({}) cannot exceed the integration rate 1/dt ({:.1})",
                    r.sample_rate_hz,
                    1.0 / r.dt
                ));
            }
        }
        if r.sample_rate_hz <= 0.0 {
            errors.push("rollout.sample_rate_hz must be > 0".to_string());
        }

        if let Some(goals) = &self.cohort.treatment_goals {
            if let Err(e) = goals.validate() {
                errors.push(format!("cohort.treatment_goals: {e}"));
            }
        }

        let s = &self.severity;
        if s.window == 0 {
            errors.push("severity.window must be > 0".to_string());
        }
        if s.stride == 0 {
            errors.push("severity.stride must be > 0".to_string());
        }
        if s.rollout_duration_s <= 0.0 {
            errors.push("severity.rollout_duration_s must be > 0".to_string());
        }
        if s.duration_sigma_years < 0.0 {
            errors.push("severity.duration_sigma_years cannot be negative".to_string());
        }
        if s.backend == SeverityBackend::Regression && s.model_path.is_none() {
            errors.push("severity.model_path is required for the regression backend".to_string());
        }
        if s.backend == SeverityBackend::Composite
            && s.motor_backend == MotorBackend::Regression
            && s.model_path.is_none()
        {
            errors.push(
                "severity.model_path is required when the composite motor component uses regression"
                    .to_string(),
            );
        }

        let o = &self.optimizer;
        if o.window == 0 {
            errors.push("optimizer.window must be > 0".to_string());
        }
        if o.n_candidates == 0 {
            errors.push("optimizer.n_candidates must be > 0".to_string());
        }
        if o.batch_size == 0 {
            errors.push("optimizer.batch_size must be >= 1".to_string());
        }
        if o.fallback_min_samples == 0 {
            errors.push("optimizer.fallback_min_samples must be >= 1".to_string());
        }
        if o.exploration_weight < 0.0 {
            errors.push("optimizer.exploration_weight cannot be negative".to_string());
        }
        if o.min_distance_frac < 0.0 {
            errors.push("optimizer.min_distance_frac cannot be negative".to_string());
        }
        if o.bounds_expansion < 0.0 {
            errors.push("optimizer.bounds_expansion cannot be negative".to_string());
        }
        for base in ParamBase::ALL {
            if let Some([lo, hi]) = o.bounds.get(base) {
                if lo >= hi {
                    errors.push(format!(
                        "optimizer.bounds.{base}: low ({lo}) must be < high ({hi})"
                    ));
                }
            }
            if o.min_span.get(base) <= 0.0 {
                errors.push(format!("optimizer.min_span.{base} must be > 0"));
            }
        }

        if self.tuning.batch_size == 0 {
            errors.push("tuning.batch_size must be >= 1".to_string());
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if let Ok(value) = toml::Value::try_from(self) {
            for key in super::validation::non_finite_keys(&value, "") {
                errors.push(format!("{key} must be a finite number"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {e}"),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Rollout
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSection {
    pub dt: f64,
    pub duration_s: f64,
    pub sample_rate_hz: f64,
    pub include_noise: bool,
}

impl Default for RolloutSection {
    fn default() -> Self {
        Self {
            dt: d::DEFAULT_DT_S,
            duration_s: d::DEFAULT_DURATION_S,
            sample_rate_hz: d::DEFAULT_SAMPLE_RATE_HZ,
            include_noise: true,
        }
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Per-channel pulse shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformKind {
    /// Area-preserving rectangular pulse train
    SquarePulse,
    Sinusoid,
    /// Half-wave rectified sine
    RectifiedSinusoid,
}

/// How per-channel waveforms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    Mean,
    /// Keep channels separate
    #[serde(rename = "none")]
    Separate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub waveform: WaveformKind,
    pub reduction: Reduction,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            waveform: WaveformKind::SquarePulse,
            reduction: Reduction::Sum,
        }
    }
}

// ============================================================================
// Drive model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveModelKind {
    /// Damped oscillator with stimulation-dependent damping
    Oscillator,
    /// Channel-averaged stimulation fed straight to the transducer
    Passthrough,
}

/// Model defaults, overridden per patient by [`crate::types::DriveParams`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub model: DriveModelKind,
    pub natural_freq_hz: f64,
    pub damping: f64,
    pub coupling: f64,
    pub inhibition: f64,
    pub drive_noise_std: f64,
    pub dt_hint_s: f64,
    pub rms_tau_s: f64,
    pub band_power_window_s: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            model: DriveModelKind::Oscillator,
            natural_freq_hz: d::DRIVE_NATURAL_FREQ_HZ,
            damping: d::DRIVE_DAMPING,
            coupling: d::DRIVE_COUPLING,
            inhibition: d::DRIVE_INHIBITION,
            drive_noise_std: d::DRIVE_NOISE_STD,
            dt_hint_s: d::DRIVE_DT_HINT_S,
            rms_tau_s: d::DRIVE_RMS_TAU_S,
            band_power_window_s: d::BAND_POWER_WINDOW_S,
        }
    }
}

// ============================================================================
// Transducer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransducerConfig {
    pub freq_hz: f64,
    pub damping: f64,
    pub gain: f64,
    pub mix: Vec<f64>,
    pub damping_floor: f64,
}

impl Default for TransducerConfig {
    fn default() -> Self {
        Self {
            freq_hz: d::TRANSDUCER_FREQ_HZ,
            damping: d::TRANSDUCER_DAMPING,
            gain: d::TRANSDUCER_GAIN,
            mix: d::TRANSDUCER_MIX.to_vec(),
            damping_floor: d::TRANSDUCER_DAMPING_FLOOR,
        }
    }
}

// ============================================================================
// Sensor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub noise_std: f64,
    pub bias_std: f64,
    pub drift_per_s: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise_std: d::SENSOR_NOISE_STD,
            bias_std: d::SENSOR_BIAS_STD,
            drift_per_s: d::SENSOR_DRIFT_PER_S,
        }
    }
}

// ============================================================================
// Cohort
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    /// Goals attached to every sampled patient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_goals: Option<TreatmentGoals>,
}

// ============================================================================
// Severity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBackend {
    /// Baseline-vs-stimulation acceleration RMS suppression
    Analytical,
    /// Pre-trained windowed regressor
    Regression,
    /// Motor score blended with treatment-goal components
    Composite,
}

/// Motor component source for the composite backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorBackend {
    Analytical,
    Regression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    pub backend: SeverityBackend,
    pub motor_backend: MotorBackend,
    /// Rollout length when scoring a parameter set (seconds)
    pub rollout_duration_s: f64,
    pub window: usize,
    pub stride: usize,
    /// JSON regressor artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    pub duration_mu_years: f64,
    pub duration_sigma_years: f64,
    /// Resample the patient for every evaluation instead of reusing the seeded one
    pub vary_patient: bool,
    /// Reuse baseline RMS across calls
    pub cache_baseline: bool,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            backend: SeverityBackend::Analytical,
            motor_backend: MotorBackend::Analytical,
            rollout_duration_s: d::SEVERITY_ROLLOUT_DURATION_S,
            window: d::SEVERITY_WINDOW,
            stride: d::SEVERITY_STRIDE,
            model_path: None,
            duration_mu_years: d::DURATION_MU_YEARS,
            duration_sigma_years: d::DURATION_SIGMA_YEARS,
            vary_patient: false,
            cache_baseline: true,
        }
    }
}

// ============================================================================
// Optimizer
// ============================================================================

/// Per-base explicit search bounds `[low, high]`, overriding inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amp: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freq_hz: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse_width_s: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_rad: Option<[f64; 2]>,
}

impl BoundsOverrides {
    pub fn get(&self, base: ParamBase) -> Option<[f64; 2]> {
        match base {
            ParamBase::Amp => self.amp,
            ParamBase::FreqHz => self.freq_hz,
            ParamBase::PulseWidthS => self.pulse_width_s,
            ParamBase::PhaseRad => self.phase_rad,
        }
    }

    /// Documented device ranges for every base.
    pub fn documented() -> Self {
        let pair = |b: ParamBase| {
            let (lo, hi) = b.documented_range();
            Some([lo, hi])
        };
        Self {
            amp: pair(ParamBase::Amp),
            freq_hz: pair(ParamBase::FreqHz),
            pulse_width_s: pair(ParamBase::PulseWidthS),
            phase_rad: pair(ParamBase::PhaseRad),
        }
    }
}

/// Half-width of the search interval around a constant column, per base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinSpanConfig {
    pub amp: f64,
    pub freq_hz: f64,
    pub pulse_width_s: f64,
    pub phase_rad: f64,
}

impl Default for MinSpanConfig {
    fn default() -> Self {
        Self {
            amp: d::MIN_SPAN_AMP,
            freq_hz: d::MIN_SPAN_FREQ_HZ,
            pulse_width_s: d::MIN_SPAN_PULSE_WIDTH_S,
            phase_rad: d::MIN_SPAN_PHASE_RAD,
        }
    }
}

impl MinSpanConfig {
    pub fn get(&self, base: ParamBase) -> f64 {
        match base {
            ParamBase::Amp => self.amp,
            ParamBase::FreqHz => self.freq_hz,
            ParamBase::PulseWidthS => self.pulse_width_s,
            ParamBase::PhaseRad => self.phase_rad,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Most recent history rows considered
    pub window: usize,
    pub n_candidates: usize,
    pub random_state: u64,
    pub batch_size: usize,
    pub exploration_weight: f64,
    pub min_distance_frac: f64,
    pub bounds_expansion: f64,
    pub fallback_min_samples: usize,
    pub min_span: MinSpanConfig,
    pub bounds: BoundsOverrides,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            window: d::HISTORY_WINDOW,
            n_candidates: d::N_CANDIDATES,
            random_state: d::RANDOM_STATE,
            batch_size: d::BATCH_SIZE,
            exploration_weight: d::EXPLORATION_WEIGHT,
            min_distance_frac: d::MIN_DISTANCE_FRAC,
            bounds_expansion: d::BOUNDS_EXPANSION,
            fallback_min_samples: d::FALLBACK_MIN_SAMPLES,
            min_span: MinSpanConfig::default(),
            bounds: BoundsOverrides::default(),
        }
    }
}

// ============================================================================
// Closed-loop tuning
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub iterations: usize,
    /// Candidates evaluated per iteration
    pub batch_size: usize,
    /// Evaluate a batch on the rayon pool
    pub parallel: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            iterations: d::TUNING_ITERATIONS,
            batch_size: d::TUNING_BATCH_SIZE,
            parallel: true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = TunerConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: TunerConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config, TunerConfig::default());
        assert_eq!(config.optimizer.n_candidates, 5000);
        assert_eq!(config.severity.window, 256);
        assert_eq!(config.encoder.waveform, WaveformKind::SquarePulse);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
seed = 11

[optimizer]
batch_size = 4

[optimizer.bounds]
amp = [0.0, 3.0]

[encoder]
reduction = "none"
"#;
        let config: TunerConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.seed, 11);
        assert_eq!(config.optimizer.batch_size, 4);
        assert_eq!(config.optimizer.bounds.amp, Some([0.0, 3.0]));
        assert_eq!(config.optimizer.bounds.freq_hz, None);
        assert_eq!(config.encoder.reduction, Reduction::Separate);
        // untouched values keep defaults
        assert_eq!(config.optimizer.exploration_weight, 0.2);
        assert_eq!(config.drive.inhibition, 80.0);
    }

    #[test]
    fn test_validation_catches_inverted_bounds() {
        let mut config = TunerConfig::default();
        config.optimizer.bounds.freq_hz = Some([200.0, 20.0]);
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("optimizer.bounds.freq_hz")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_catches_bad_goals() {
        let mut config = TunerConfig::default();
        config.cohort.treatment_goals = Some(TreatmentGoals {
            w_motor: 0.9,
            ..TreatmentGoals::balanced()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_catches_sample_rate_above_integration_rate() {
        let mut config = TunerConfig::default();
        config.rollout.sample_rate_hz = 5000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_regression_backend_requires_model_path() {
        let mut config = TunerConfig::default();
        config.severity.backend = SeverityBackend::Regression;
        assert!(config.validate().is_err());
        config.severity.model_path = Some(PathBuf::from("model.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut config = TunerConfig::default();
        config.optimizer.batch_size = 0;
        config.optimizer.fallback_min_samples = 0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut original = TunerConfig::default();
        original.cohort.treatment_goals = Some(TreatmentGoals::motor_focused());
        original.optimizer.bounds = BoundsOverrides::documented();
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: TunerConfig =
            toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn test_all_sections_serialize() {
        let toml_str = TunerConfig::default().to_toml().expect("serialization should work");
        for section in [
            "[rollout]",
            "[encoder]",
            "[drive]",
            "[transducer]",
            "[sensor]",
            "[severity]",
            "[optimizer]",
            "[optimizer.min_span]",
            "[tuning]",
        ] {
            assert!(toml_str.contains(section), "Missing {section} section");
        }
    }

    #[test]
    fn test_rollout_config_carries_schema() {
        let mut config = TunerConfig::default();
        config.schema_version = "sim.v2".into();
        assert_eq!(config.rollout_config().schema_version, "sim.v2");
    }
}
