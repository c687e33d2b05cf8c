//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::{DriveModelKind, TunerConfig};

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `TunerConfig`.
///
/// Maintained by hand to match the struct hierarchy in `tuner_config.rs`.
/// Any new field added there must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "seed",
        "schema_version",
        // [rollout]
        "rollout",
        "rollout.dt",
        "rollout.duration_s",
        "rollout.sample_rate_hz",
        "rollout.include_noise",
        // [encoder]
        "encoder",
        "encoder.waveform",
        "encoder.reduction",
        // [drive]
        "drive",
        "drive.model",
        "drive.natural_freq_hz",
        "drive.damping",
        "drive.coupling",
        "drive.inhibition",
        "drive.drive_noise_std",
        "drive.dt_hint_s",
        "drive.rms_tau_s",
        "drive.band_power_window_s",
        // [transducer]
        "transducer",
        "transducer.freq_hz",
        "transducer.damping",
        "transducer.gain",
        "transducer.mix",
        "transducer.damping_floor",
        // [sensor]
        "sensor",
        "sensor.noise_std",
        "sensor.bias_std",
        "sensor.drift_per_s",
        // [cohort]
        "cohort",
        "cohort.treatment_goals",
        "cohort.treatment_goals.w_motor",
        "cohort.treatment_goals.w_non_motor",
        "cohort.treatment_goals.w_duration",
        "cohort.treatment_goals.w_speech",
        "cohort.treatment_goals.non_motor_diary_ratio",
        "cohort.treatment_goals.patient_id",
        "cohort.treatment_goals.notes",
        // [severity]
        "severity",
        "severity.backend",
        "severity.motor_backend",
        "severity.rollout_duration_s",
        "severity.window",
        "severity.stride",
        "severity.model_path",
        "severity.duration_mu_years",
        "severity.duration_sigma_years",
        "severity.vary_patient",
        "severity.cache_baseline",
        // [optimizer]
        "optimizer",
        "optimizer.window",
        "optimizer.n_candidates",
        "optimizer.random_state",
        "optimizer.batch_size",
        "optimizer.exploration_weight",
        "optimizer.min_distance_frac",
        "optimizer.bounds_expansion",
        "optimizer.fallback_min_samples",
        // [optimizer.min_span]
        "optimizer.min_span",
        "optimizer.min_span.amp",
        "optimizer.min_span.freq_hz",
        "optimizer.min_span.pulse_width_s",
        "optimizer.min_span.phase_rad",
        // [optimizer.bounds]
        "optimizer.bounds",
        "optimizer.bounds.amp",
        "optimizer.bounds.freq_hz",
        "optimizer.bounds.pulse_width_s",
        "optimizer.bounds.phase_rad",
        // [tuning]
        "tuning",
        "tuning.iterations",
        "tuning.batch_size",
        "tuning.parallel",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = join(prefix, k);
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Dotted paths of every float that is NaN or infinite, arrays included.
pub fn non_finite_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    match value {
        toml::Value::Float(f) if !f.is_finite() => vec![prefix.to_string()],
        toml::Value::Table(table) => table
            .iter()
            .flat_map(|(k, v)| non_finite_keys(v, &join(prefix, k)))
            .collect(),
        toml::Value::Array(items) => items
            .iter()
            .enumerate()
            .flat_map(|(i, v)| non_finite_keys(v, &format!("{prefix}[{i}]")))
            .collect(),
        _ => Vec::new(),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys. Existing configs always continue to work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        // parse errors are reported by serde later
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed `TunerConfig`.
///
/// Returns (errors, warnings). Errors are values the integrators cannot run
/// with; warnings are legal but outside the range the models were tuned for.
pub fn validate_physical_ranges(config: &TunerConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let dr = &config.drive;
    if dr.model == DriveModelKind::Oscillator {
        if dr.natural_freq_hz <= 0.0 {
            errors.push(format!(
                "drive.natural_freq_hz = {:.2} must be > 0",
                dr.natural_freq_hz
            ));
        }
        if dr.damping <= 0.0 {
            errors.push(format!("drive.damping = {:.3} must be > 0", dr.damping));
        }
        if dr.rms_tau_s <= 0.0 {
            errors.push(format!("drive.rms_tau_s = {:.4} must be > 0", dr.rms_tau_s));
        }
        if dr.inhibition < 0.0 {
            errors.push(format!("drive.inhibition = {:.1} cannot be negative", dr.inhibition));
        }
        if dr.drive_noise_std < 0.0 {
            errors.push(format!(
                "drive.drive_noise_std = {:.2} cannot be negative",
                dr.drive_noise_std
            ));
        }
        // Pathological tremor sits at 3-12 Hz
        if !(2.0..=12.0).contains(&dr.natural_freq_hz) {
            warnings.push(ValidationWarning {
                field: "drive.natural_freq_hz".to_string(),
                message: format!(
                    "drive.natural_freq_hz = {:.1} is outside the typical tremor band (2-12 Hz)",
                    dr.natural_freq_hz
                ),
                suggestion: None,
            });
        }
        if dr.inhibition == 0.0 {
            warnings.push(ValidationWarning {
                field: "drive.inhibition".to_string(),
                message: "drive.inhibition = 0 disables stimulation-driven suppression".to_string(),
                suggestion: None,
            });
        }
    }
    if dr.dt_hint_s <= 0.0 {
        errors.push(format!("drive.dt_hint_s = {} must be > 0", dr.dt_hint_s));
    }

    let tr = &config.transducer;
    if tr.freq_hz <= 0.0 {
        errors.push(format!("transducer.freq_hz = {:.2} must be > 0", tr.freq_hz));
    }
    if tr.damping_floor <= 0.0 {
        errors.push(format!(
            "transducer.damping_floor = {} must be > 0",
            tr.damping_floor
        ));
    }
    if tr.mix.is_empty() || tr.mix.len() > 3 {
        warnings.push(ValidationWarning {
            field: "transducer.mix".to_string(),
            message: format!(
                "transducer.mix has {} entries; it is truncated or padded to 3 axes",
                tr.mix.len()
            ),
            suggestion: None,
        });
    }

    let se = &config.sensor;
    for (name, value) in [
        ("sensor.noise_std", se.noise_std),
        ("sensor.bias_std", se.bias_std),
        ("sensor.drift_per_s", se.drift_per_s),
    ] {
        if value < 0.0 {
            errors.push(format!("{name} = {value} cannot be negative"));
        }
    }

    // Stability guarantees are established for rollouts up to 300 s
    for (name, value) in [
        ("rollout.duration_s", config.rollout.duration_s),
        ("severity.rollout_duration_s", config.severity.rollout_duration_s),
    ] {
        if value > 300.0 {
            warnings.push(ValidationWarning {
                field: name.to_string(),
                message: format!("{name} = {value:.0} exceeds the 300 s stability envelope"),
                suggestion: None,
            });
        }
    }

    // Tremor band Nyquist
    if config.rollout.sample_rate_hz < 25.0 {
        warnings.push(ValidationWarning {
            field: "rollout.sample_rate_hz".to_string(),
            message: format!(
                "rollout.sample_rate_hz = {:.1} undersamples the tremor band",
                config.rollout.sample_rate_hz
            ),
            suggestion: None,
        });
    }

    if config.optimizer.n_candidates < 100 {
        warnings.push(ValidationWarning {
            field: "optimizer.n_candidates".to_string(),
            message: format!(
                "optimizer.n_candidates = {} gives a very sparse acquisition search",
                config.optimizer.n_candidates
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
