//! Rollout configuration and the time-indexed states produced by one
//! simulator run.

use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    DEFAULT_DT_S, DEFAULT_DURATION_S, DEFAULT_SAMPLE_RATE_HZ, DEFAULT_SCHEMA_VERSION,
};
use crate::error::{CoreError, CoreResult};

/// Three-axis sample (x, y, z).
pub type Vec3 = [f64; 3];

// ============================================================================
// RolloutConfig
// ============================================================================

/// Integration step, duration and sensor settings for one rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Integration time step (seconds)
    pub dt: f64,
    /// Total simulated duration (seconds)
    pub duration_s: f64,
    /// Sensor output rate (Hz)
    pub sample_rate_hz: f64,
    /// Apply measurement noise, bias and drift
    pub include_noise: bool,
    /// Schema tag copied into measurement metadata
    pub schema_version: String,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_DT_S,
            duration_s: DEFAULT_DURATION_S,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            include_noise: true,
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        }
    }
}

impl RolloutConfig {
    /// Same settings with a different duration.
    pub fn with_duration(&self, duration_s: f64) -> Self {
        Self {
            duration_s,
            ..self.clone()
        }
    }

    /// Number of integration steps: `floor(duration / dt) + 1`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn n_steps(&self) -> usize {
        (self.duration_s / self.dt).floor() as usize + 1
    }

    /// Evenly spaced grid from 0 to `duration_s` with [`Self::n_steps`] points.
    #[allow(clippy::cast_precision_loss)]
    pub fn time_grid(&self) -> Vec<f64> {
        let n = self.n_steps();
        if n == 1 {
            return vec![0.0];
        }
        let step = self.duration_s / (n - 1) as f64;
        (0..n).map(|i| i as f64 * step).collect()
    }

    /// Reject configurations the integrators cannot run.
    pub fn check(&self) -> CoreResult<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(CoreError::shape("rollout config", "dt > 0", format!("dt = {}", self.dt)));
        }
        if !(self.duration_s.is_finite() && self.duration_s >= 0.0) {
            return Err(CoreError::shape(
                "rollout config",
                "duration_s >= 0",
                format!("duration_s = {}", self.duration_s),
            ));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(CoreError::shape(
                "rollout config",
                "sample_rate_hz > 0",
                format!("sample_rate_hz = {}", self.sample_rate_hz),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Intermediate states
// ============================================================================

/// Output of a drive model: the scalar drive fed to the transducer plus
/// diagnostic features.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentState {
    pub t: Vec<f64>,
    /// Scalar neural drive per time step
    pub drive: Vec<f64>,
    /// Stimulation input seen by the drive model (channel 0 or channel mean)
    pub drive_in: Vec<f64>,
    /// Smoothed band-power proxy, present for oscillator models
    pub band_power: Option<Vec<f64>>,
}

/// Full-rate kinematics from the peripheral transducer.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicState {
    pub t: Vec<f64>,
    pub pos: Vec<Vec3>,
    pub vel: Vec<Vec3>,
    pub acc: Vec<Vec3>,
}

// ============================================================================
// MeasurementOutput
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementMeta {
    pub schema_version: String,
    pub sample_rate_hz: f64,
    pub n_samples: usize,
}

/// Sensor-rate trace returned by [`crate::simulation::Simulator::simulate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementOutput {
    pub t: Vec<f64>,
    pub pos: Vec<Vec3>,
    pub vel: Vec<Vec3>,
    pub acc: Vec<Vec3>,
    pub meta: MeasurementMeta,
}

impl MeasurementOutput {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Per-sample concatenation `(pos, vel, acc)`.
    pub fn to_nine_channel(&self) -> Vec<[f64; 9]> {
        self.pos
            .iter()
            .zip(&self.vel)
            .zip(&self.acc)
            .map(|((p, v), a)| [p[0], p[1], p[2], v[0], v[1], v[2], a[0], a[1], a[2]])
            .collect()
    }

    /// Largest absolute position component over the trace.
    pub fn max_abs_position(&self) -> f64 {
        self.pos
            .iter()
            .flat_map(|p| p.iter())
            .fold(0.0_f64, |m, x| m.max(x.abs()))
    }

    pub fn is_finite(&self) -> bool {
        [&self.pos, &self.vel, &self.acc]
            .iter()
            .all(|series| series.iter().all(|s| s.iter().all(|x| x.is_finite())))
    }

    /// RMS of the acceleration magnitude.
    #[allow(clippy::cast_precision_loss)]
    pub fn acc_magnitude_rms(&self) -> f64 {
        if self.acc.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.acc.iter().map(|a| a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sum();
        (sum_sq / self.acc.len() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_count_and_grid() {
        let cfg = RolloutConfig {
            dt: 0.001,
            duration_s: 1.0,
            ..RolloutConfig::default()
        };
        assert_eq!(cfg.n_steps(), 1001);
        let t = cfg.time_grid();
        assert_eq!(t.len(), 1001);
        assert_eq!(t[0], 0.0);
        assert!((t[1000] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_duration_single_step() {
        let cfg = RolloutConfig {
            duration_s: 0.0,
            ..RolloutConfig::default()
        };
        assert_eq!(cfg.time_grid(), vec![0.0]);
    }

    #[test]
    fn test_check_rejects_bad_dt() {
        let cfg = RolloutConfig {
            dt: 0.0,
            ..RolloutConfig::default()
        };
        assert!(cfg.check().is_err());
        assert!(RolloutConfig::default().check().is_ok());
    }

    #[test]
    fn test_nine_channel_layout() {
        let out = MeasurementOutput {
            t: vec![0.0],
            pos: vec![[1.0, 2.0, 3.0]],
            vel: vec![[4.0, 5.0, 6.0]],
            acc: vec![[7.0, 8.0, 9.0]],
            meta: MeasurementMeta {
                schema_version: "sim.v1".into(),
                sample_rate_hz: 100.0,
                n_samples: 1,
            },
        };
        assert_eq!(out.to_nine_channel()[0], [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(out.max_abs_position(), 3.0);
        assert!((out.acc_magnitude_rms() - (49.0_f64 + 64.0 + 81.0).sqrt()).abs() < 1e-12);
    }
}
