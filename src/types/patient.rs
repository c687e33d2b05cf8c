//! Patient physiology, treatment goals and clinical context.
//!
//! Each physiological subsystem gets its own struct of optional overrides.
//! `None` means "use the model default", so a `PatientParams::default()`
//! reproduces the nominal simulator exactly.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{CoreError, CoreResult};

// ============================================================================
// Subsystem overrides
// ============================================================================

/// Neural drive oscillator overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveParams {
    pub natural_freq_hz: Option<f64>,
    pub damping: Option<f64>,
    pub coupling: Option<f64>,
    pub inhibition: Option<f64>,
    pub drive_noise_std: Option<f64>,
}

/// Peripheral spring-mass overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransducerParams {
    pub freq_hz: Option<f64>,
    pub damping: Option<f64>,
    pub gain: Option<f64>,
    /// Per-axis weights mapping the scalar drive onto X/Y/Z
    pub mix: Option<Vec<f64>>,
}

/// Sensor imperfection overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorParams {
    pub noise_std: Option<f64>,
    pub bias_std: Option<f64>,
    pub drift_per_s: Option<f64>,
}

// ============================================================================
// Treatment goals
// ============================================================================

/// Relative importance of the severity components for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentGoals {
    pub w_motor: f64,
    pub w_non_motor: f64,
    pub w_duration: f64,
    pub w_speech: f64,
    /// Blend between diary (1.0) and standardized tests (0.0) for the
    /// non-motor component
    pub non_motor_diary_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

const GOAL_SUM_TOLERANCE: f64 = 1e-6;

impl TreatmentGoals {
    /// Build validated goals: weights non-negative and summing to 1, ratio in [0, 1].
    pub fn new(
        w_motor: f64,
        w_non_motor: f64,
        w_duration: f64,
        w_speech: f64,
        non_motor_diary_ratio: f64,
    ) -> CoreResult<Self> {
        let goals = Self {
            w_motor,
            w_non_motor,
            w_duration,
            w_speech,
            non_motor_diary_ratio,
            patient_id: None,
            notes: None,
        };
        goals.validate()?;
        Ok(goals)
    }

    pub fn balanced() -> Self {
        Self::preset(0.33, 0.33, 0.34, 0.5)
    }

    pub fn motor_focused() -> Self {
        Self::preset(0.55, 0.35, 0.10, 0.5)
    }

    pub fn quality_of_life_focused() -> Self {
        Self::preset(0.20, 0.70, 0.10, 0.65)
    }

    fn preset(w_motor: f64, w_non_motor: f64, w_duration: f64, ratio: f64) -> Self {
        Self {
            w_motor,
            w_non_motor,
            w_duration,
            w_speech: 0.0,
            non_motor_diary_ratio: ratio,
            patient_id: None,
            notes: None,
        }
    }

    pub fn weight_sum(&self) -> f64 {
        self.w_motor + self.w_non_motor + self.w_duration + self.w_speech
    }

    pub fn validate(&self) -> CoreResult<()> {
        let weights = [self.w_motor, self.w_non_motor, self.w_duration, self.w_speech];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CoreError::shape(
                "treatment goals",
                "non-negative finite weights",
                format!("{weights:?}"),
            ));
        }
        let total = self.weight_sum();
        if (total - 1.0).abs() > GOAL_SUM_TOLERANCE {
            return Err(CoreError::shape(
                "treatment goals",
                "weights summing to 1.0",
                format!("sum = {total:.6}"),
            ));
        }
        if !(0.0..=1.0).contains(&self.non_motor_diary_ratio) {
            return Err(CoreError::shape(
                "treatment goals",
                "non_motor_diary_ratio in [0, 1]",
                format!("{}", self.non_motor_diary_ratio),
            ));
        }
        Ok(())
    }

    /// Copy with weights rescaled to sum to 1. All-zero weights fall back to
    /// [`Self::balanced`].
    pub fn normalized(&self) -> Self {
        let total = self.weight_sum();
        if total < 1e-9 {
            return Self {
                patient_id: self.patient_id.clone(),
                notes: self.notes.clone(),
                ..Self::balanced()
            };
        }
        Self {
            w_motor: self.w_motor / total,
            w_non_motor: self.w_non_motor / total,
            w_duration: self.w_duration / total,
            w_speech: self.w_speech / total,
            ..self.clone()
        }
    }
}

impl Default for TreatmentGoals {
    fn default() -> Self {
        Self::balanced()
    }
}

// ============================================================================
// PatientParams
// ============================================================================

/// One synthetic patient. Immutable once sampled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientParams {
    /// Stable identifier, used as the baseline cache key when present
    pub id: Option<String>,
    pub drive: DriveParams,
    pub transducer: TransducerParams,
    pub sensor: SensorParams,
    pub treatment_goals: Option<TreatmentGoals>,
}

impl PatientParams {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_goals(mut self, goals: TreatmentGoals) -> Self {
        self.treatment_goals = Some(goals);
        self
    }

    /// Key identifying this patient's physiology.
    ///
    /// The explicit id wins; otherwise the bit patterns of every physiological
    /// override are hashed, so two patients with identical parameters share a key.
    pub fn cache_key(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        let mut hasher = DefaultHasher::new();
        let d = &self.drive;
        let p = &self.transducer;
        let s = &self.sensor;
        for value in [
            d.natural_freq_hz,
            d.damping,
            d.coupling,
            d.inhibition,
            d.drive_noise_std,
            p.freq_hz,
            p.damping,
            p.gain,
            s.noise_std,
            s.bias_std,
            s.drift_per_s,
        ] {
            value.map(f64::to_bits).hash(&mut hasher);
        }
        p.mix
            .as_ref()
            .map(|m| m.iter().map(|x| x.to_bits()).collect::<Vec<_>>())
            .hash(&mut hasher);
        format!("anon-{:016x}", hasher.finish())
    }
}

// ============================================================================
// PatientContext
// ============================================================================

/// Longitudinal clinical data feeding the composite severity.
///
/// Burdens are fractions in [0, 1] of questionnaire items above threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientContext {
    pub diary_burden: Option<f64>,
    pub standard_test_burden: Option<f64>,
    pub years_since_diagnosis: Option<f64>,
    /// Already-scaled speech component in [-1, 1]
    pub speech_component: Option<f64>,
}
