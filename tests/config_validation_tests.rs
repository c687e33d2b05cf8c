//! Config Validation Tests
//!
//! Typo detection and physical range validation for `TunerConfig`,
//! exercised independently from the simulator and optimizer.

use stimtune::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use stimtune::config::{ConfigError, SeverityBackend, TunerConfig};
use stimtune::types::TreatmentGoals;

// ============================================================================
// Typo Detection Tests
// ============================================================================

#[test]
fn typo_in_optimizer_key_warns_with_suggestion() {
    let toml_str = r#"
[optimizer]
min_distence_frac = 0.1
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("min_distence_frac"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("optimizer.min_distance_frac"),
        "Should suggest the correct spelling"
    );
}

#[test]
fn typo_in_top_level_key_warns() {
    let warnings = validate_unknown_keys("sede = 3\n");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("seed"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
seed = 11

[rollout]
dt = 0.001
duration_s = 20.0
sample_rate_hz = 100.0
include_noise = false

[encoder]
waveform = "square_pulse"

[drive]
model = "oscillator"
natural_freq_hz = 5.5

[severity]
backend = "analytical"
rollout_duration_s = 60.0
vary_patient = true

[optimizer]
window = 40
batch_size = 3
exploration_weight = 0.1

[optimizer.bounds]
amp = [0.0, 5.0]

[tuning]
iterations = 5
parallel = false
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(
        warnings.is_empty(),
        "Valid config should produce 0 warnings, got: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
    let config = TunerConfig::from_toml_str(toml_str).expect("valid config should load");
    assert_eq!(config.seed, 11);
    assert_eq!(config.optimizer.bounds.amp, Some([0.0, 5.0]));
    assert!(!config.tuning.parallel);
}

#[test]
fn unknown_section_warns() {
    let toml_str = r#"
[telemetry]
endpoint = "localhost"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(!warnings.is_empty(), "Unknown section should produce at least 1 warning");
    assert!(warnings.iter().any(|w| w.field.contains("telemetry")));
}

#[test]
fn multiple_typos_all_warned() {
    let toml_str = r#"
[severity]
bakend = "analytical"

[tuning]
iteratons = 4
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 2, "Expected 2 warnings for 2 typos, got {}", warnings.len());
}

#[test]
fn empty_toml_produces_zero_warnings() {
    assert!(validate_unknown_keys("").is_empty());
}

#[test]
fn known_keys_set_is_complete() {
    let mut config = TunerConfig::default();
    config.cohort.treatment_goals = Some(TreatmentGoals::balanced());
    config.optimizer.bounds.freq_hz = Some([20.0, 200.0]);
    let toml_str = config.to_toml().expect("Default config should serialize");
    let warnings = validate_unknown_keys(&toml_str);
    assert!(
        warnings.is_empty(),
        "Default config serialization should produce 0 unknown-key warnings, got: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
}

#[test]
fn suggest_correction_finds_close_match() {
    let known = known_config_keys();
    let s = suggest_correction("optimizer.n_candidate", &known);
    assert_eq!(s.as_deref(), Some("optimizer.n_candidates"));
}

#[test]
fn suggest_correction_returns_none_for_garbage() {
    let known = known_config_keys();
    assert!(suggest_correction("zzz_completely_invalid_xyz_12345", &known).is_none());
}

// ============================================================================
// Range Validation Tests
// ============================================================================

#[test]
fn negative_sensor_noise_is_error() {
    let mut config = TunerConfig::default();
    config.sensor.noise_std = -0.1;
    let (errors, _) = validate_physical_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("sensor.noise_std")));
}

#[test]
fn zero_transducer_freq_is_error() {
    let mut config = TunerConfig::default();
    config.transducer.freq_hz = 0.0;
    let (errors, _) = validate_physical_ranges(&config);
    assert!(errors.iter().any(|e| e.contains("transducer.freq_hz")));
}

#[test]
fn drive_outside_tremor_band_is_warning() {
    let mut config = TunerConfig::default();
    config.drive.natural_freq_hz = 20.0;
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.field == "drive.natural_freq_hz"));
}

#[test]
fn long_rollout_is_warning() {
    let mut config = TunerConfig::default();
    config.rollout.duration_s = 600.0;
    let (_, warnings) = validate_physical_ranges(&config);
    assert!(warnings.iter().any(|w| w.field == "rollout.duration_s"));
}

#[test]
fn all_defaults_pass_validation() {
    let config = TunerConfig::default();
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty(), "Default config should have 0 range errors: {errors:?}");
    assert!(
        warnings.is_empty(),
        "Default config should have 0 range warnings: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
    assert!(config.validate().is_ok(), "Default config must always pass full validation");
}

// ============================================================================
// validate() Structural Checks
// ============================================================================

fn validation_errors(config: &TunerConfig) -> Vec<String> {
    match config.validate() {
        Err(ConfigError::Validation(errors)) => errors,
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[test]
fn validate_rejects_duration_below_dt() {
    let mut config = TunerConfig::default();
    config.rollout.duration_s = 1e-4;
    assert!(validation_errors(&config).iter().any(|e| e.contains("rollout.duration_s")));
}

#[test]
fn validate_rejects_sample_rate_above_integration_rate() {
    let mut config = TunerConfig::default();
    config.rollout.sample_rate_hz = 5000.0;
    assert!(validation_errors(&config).iter().any(|e| e.contains("sample_rate_hz")));
}

#[test]
fn validate_rejects_inverted_bounds() {
    let mut config = TunerConfig::default();
    config.optimizer.bounds.amp = Some([3.0, 1.0]);
    assert!(validation_errors(&config).iter().any(|e| e.contains("optimizer.bounds.amp")));
}

#[test]
fn validate_rejects_zero_batch_size() {
    let mut config = TunerConfig::default();
    config.optimizer.batch_size = 0;
    config.tuning.batch_size = 0;
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.contains("optimizer.batch_size")));
    assert!(errors.iter().any(|e| e.contains("tuning.batch_size")));
}

#[test]
fn validate_rejects_goal_weights_not_summing_to_one() {
    let mut config = TunerConfig::default();
    let mut goals = TreatmentGoals::balanced();
    goals.w_motor = 0.9;
    config.cohort.treatment_goals = Some(goals);
    assert!(validation_errors(&config).iter().any(|e| e.contains("treatment_goals")));
}

#[test]
fn validate_requires_model_for_regression() {
    let mut config = TunerConfig::default();
    config.severity.backend = SeverityBackend::Regression;
    assert!(validation_errors(&config).iter().any(|e| e.contains("model_path")));
}

#[test]
fn nan_in_toml_is_rejected() {
    let result = TunerConfig::from_toml_str("[optimizer]\nexploration_weight = nan\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

// ============================================================================
// Config Roundtrip Tests
// ============================================================================

#[test]
fn config_roundtrip_preserves_values() {
    let mut original = TunerConfig::default();
    original.seed = 99;
    original.optimizer.exploration_weight = 0.35;
    original.severity.rollout_duration_s = 45.0;
    original.cohort.treatment_goals = Some(TreatmentGoals::motor_focused());

    let toml_str = original.to_toml().expect("Serialization should work");
    let roundtripped: TunerConfig = toml::from_str(&toml_str).expect("Deserialization should work");

    assert_eq!(roundtripped.seed, 99);
    assert!((roundtripped.optimizer.exploration_weight - 0.35).abs() < f64::EPSILON);
    assert!((roundtripped.severity.rollout_duration_s - 45.0).abs() < f64::EPSILON);
    assert_eq!(roundtripped.cohort.treatment_goals, original.cohort.treatment_goals);
    assert!(roundtripped.validate().is_ok(), "Roundtripped config should pass validation");
}

#[test]
fn partial_config_fills_defaults() {
    let config = TunerConfig::from_toml_str("[tuning]\niterations = 2\n").expect("partial config loads");
    assert_eq!(config.tuning.iterations, 2);
    assert_eq!(config, {
        let mut d = TunerConfig::default();
        d.tuning.iterations = 2;
        d
    });
}

#[test]
fn config_file_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stimtune.toml");
    let mut original = TunerConfig::default();
    original.tuning.batch_size = 5;
    original.save_to_file(&path).expect("save");
    let loaded = TunerConfig::load_from_file(&path).expect("load");
    assert_eq!(loaded.tuning.batch_size, 5);
}

#[test]
fn missing_file_is_io_error() {
    let result = TunerConfig::load_from_file(std::path::Path::new("/nonexistent/stimtune.toml"));
    assert!(matches!(result, Err(ConfigError::Io(..))));
}
