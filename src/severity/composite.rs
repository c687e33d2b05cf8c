//! Composite severity: motor score blended with clinical components
//! according to the patient's treatment goals.

use crate::config::defaults::COMPOSITE_WEIGHT_FLOOR;
use crate::types::{PatientContext, TreatmentGoals};

/// Non-motor burden in [0, 1] rescaled to [-1, 1].
///
/// `ratio` weights the diary against the standardized test. When only one
/// source is present it stands in for the other.
pub fn non_motor_component(context: &PatientContext, ratio: f64) -> Option<f64> {
    let (diary, tests) = match (context.diary_burden, context.standard_test_burden) {
        (None, None) => return None,
        (Some(d), None) => (d, d),
        (None, Some(t)) => (t, t),
        (Some(d), Some(t)) => (d, t),
    };
    let r = ratio.clamp(0.0, 1.0);
    let burden = (r * diary + (1.0 - r) * tests).clamp(0.0, 1.0);
    Some(2.0 * burden - 1.0)
}

/// `tanh((years - mu) / sigma)`, or 0 for a degenerate sigma.
pub fn duration_component(years: f64, mu: f64, sigma: f64) -> f64 {
    if sigma > 1e-6 {
        ((years.max(0.0) - mu) / sigma).tanh()
    } else {
        0.0
    }
}

/// Normalisation constants for the disease-duration component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationScale {
    pub mu_years: f64,
    pub sigma_years: f64,
}

/// Weighted blend of the available components, clamped to [-1, 1].
///
/// Components without data drop out and the remaining weights are
/// renormalised. Without any context the motor score is returned as is.
pub fn composite_severity(
    motor: f64,
    goals: &TreatmentGoals,
    context: Option<&PatientContext>,
    scale: DurationScale,
) -> f64 {
    let Some(context) = context else {
        return motor.clamp(-1.0, 1.0);
    };
    let goals = goals.normalized();

    let mut parts: Vec<(f64, f64)> = vec![(goals.w_motor, motor)];
    if let Some(non_motor) = non_motor_component(context, goals.non_motor_diary_ratio) {
        parts.push((goals.w_non_motor, non_motor));
    }
    if let Some(years) = context.years_since_diagnosis {
        parts.push((
            goals.w_duration,
            duration_component(years, scale.mu_years, scale.sigma_years),
        ));
    }
    if let Some(speech) = context.speech_component {
        parts.push((goals.w_speech, speech.clamp(-1.0, 1.0)));
    }

    let total: f64 = parts.iter().map(|(w, _)| w).sum();
    let blended: f64 = parts.iter().map(|(w, v)| w * v).sum::<f64>() / total.max(COMPOSITE_WEIGHT_FLOOR);
    blended.clamp(-1.0, 1.0)
}
