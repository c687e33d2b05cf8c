//! Neural drive models: stimulation in, scalar pathological drive out.
//!
//! ## Oscillator
//!
//! `z'' = -(2 zeta omega + k * rms(u)) z' - omega^2 z + c u + noise`
//!
//! Integrated with Euler-Maruyama at the grid step. `rms(u)` is an
//! exponentially smoothed running RMS of the stimulation (tau = 20 ms), so
//! sustained high-energy stimulation raises the effective damping no matter
//! which of amplitude, frequency or pulse width carries the energy. Noise
//! enters the velocity scaled by `sigma * sqrt(dt)`, which keeps the
//! stationary variance independent of the step size.

use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::TAU;

use super::waveform::Stimulation;
use crate::config::{DriveConfig, DriveModelKind};
use crate::error::{CoreError, CoreResult};
use crate::types::{DriveParams, LatentState};

/// A model turning encoded stimulation into the latent drive.
pub trait DriveModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the model on grid `t`. Consumes randomness from `rng` in a fixed
    /// order so equal seeds give equal trajectories.
    fn simulate(
        &self,
        t: &[f64],
        stimulation: &Stimulation,
        patient: &DriveParams,
        rng: &mut dyn RngCore,
    ) -> CoreResult<LatentState>;
}

/// Build the configured drive model.
pub fn build_drive_model(config: &DriveConfig) -> Box<dyn DriveModel> {
    match config.model {
        DriveModelKind::Oscillator => Box::new(OscillatorDrive::new(config.clone())),
        DriveModelKind::Passthrough => Box::new(PassthroughDrive),
    }
}

fn check_length(t: &[f64], input: &[f64]) -> CoreResult<()> {
    if input.len() == t.len() {
        Ok(())
    } else {
        Err(CoreError::shape(
            "drive model input",
            format!("{} samples", t.len()),
            format!("{} samples", input.len()),
        ))
    }
}

/// Mean grid spacing, or `hint` for a grid with fewer than two points.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn grid_step(t: &[f64], hint: f64) -> f64 {
    if t.len() > 1 {
        (t[t.len() - 1] - t[0]) / (t.len() - 1) as f64
    } else {
        hint
    }
}

// ============================================================================
// Oscillator
// ============================================================================

#[derive(Debug, Clone)]
pub struct OscillatorDrive {
    config: DriveConfig,
}

impl Default for OscillatorDrive {
    fn default() -> Self {
        Self::new(DriveConfig::default())
    }
}

impl OscillatorDrive {
    pub fn new(config: DriveConfig) -> Self {
        Self { config }
    }
}

impl DriveModel for OscillatorDrive {
    fn name(&self) -> &'static str {
        "oscillator"
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::many_single_char_names
    )]
    fn simulate(
        &self,
        t: &[f64],
        stimulation: &Stimulation,
        patient: &DriveParams,
        rng: &mut dyn RngCore,
    ) -> CoreResult<LatentState> {
        let cfg = &self.config;
        let u = stimulation.primary();
        check_length(t, u)?;

        let n = t.len();
        let omega = TAU * patient.natural_freq_hz.unwrap_or(cfg.natural_freq_hz);
        let damping = patient.damping.unwrap_or(cfg.damping);
        let coupling = patient.coupling.unwrap_or(cfg.coupling);
        let inhibition = patient.inhibition.unwrap_or(cfg.inhibition);
        let noise_std = patient.drive_noise_std.unwrap_or(cfg.drive_noise_std);

        let dt = grid_step(t, cfg.dt_hint_s);

        let noise_scale = noise_std * dt.sqrt();
        let noise: Vec<f64> = (0..n)
            .map(|_| {
                let e: f64 = StandardNormal.sample(&mut *rng);
                e * noise_scale
            })
            .collect();

        let alpha = 1.0 - (-dt / cfg.rms_tau_s).exp();
        let base_damping = 2.0 * damping * omega;
        let omega_sq = omega * omega;

        let mut z = vec![0.0; n];
        let mut v = vec![0.0; n];
        let mut mean_sq = 0.0;
        for i in 1..n {
            mean_sq = alpha * u[i - 1] * u[i - 1] + (1.0 - alpha) * mean_sq;
            let effective = base_damping + inhibition * mean_sq.sqrt();
            let a = -effective * v[i - 1] - omega_sq * z[i - 1] + coupling * u[i - 1];
            v[i] = v[i - 1] + dt * a + noise[i - 1];
            z[i] = z[i - 1] + dt * v[i];
        }

        let window = ((cfg.band_power_window_s / dt.max(1e-6)) as usize).max(2);
        let band_power = moving_rms(&z, window);

        Ok(LatentState {
            t: t.to_vec(),
            drive: z,
            drive_in: u.to_vec(),
            band_power: Some(band_power),
        })
    }
}

// ============================================================================
// Passthrough
// ============================================================================

/// Feeds the channel-averaged stimulation straight to the transducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDrive;

impl DriveModel for PassthroughDrive {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn simulate(
        &self,
        t: &[f64],
        stimulation: &Stimulation,
        _patient: &DriveParams,
        _rng: &mut dyn RngCore,
    ) -> CoreResult<LatentState> {
        let drive = stimulation.channel_mean();
        check_length(t, &drive)?;
        Ok(LatentState {
            t: t.to_vec(),
            drive_in: drive.clone(),
            drive,
            band_power: None,
        })
    }
}

// ============================================================================
// Moving RMS
// ============================================================================

/// Centred moving RMS over `window` samples, zero-padded at the edges.
///
/// Every output divides by the full window length, so values taper towards
/// the ends of the signal.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn moving_rms(x: &[f64], window: usize) -> Vec<f64> {
    let n = x.len();
    let w = window.max(1);
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &xi in x {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + xi * xi);
    }

    let offset = ((w - 1) / 2) as isize;
    let reach = (w - 1) as isize;
    (0..n as isize)
        .map(|i| {
            let hi = (i + offset).min(n as isize - 1);
            let lo = (i + offset - reach).max(0);
            if hi < lo {
                return 0.0;
            }
            let sum = prefix[hi as usize + 1] - prefix[lo as usize];
            (sum.max(0.0) / w as f64).sqrt()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid(dt: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * dt).collect()
    }

    fn constant(t: &[f64], level: f64) -> Stimulation {
        Stimulation {
            channels: vec![vec![level; t.len()]],
        }
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_moving_rms_constant_interior() {
        let x = vec![2.0; 20];
        let out = moving_rms(&x, 4);
        assert_eq!(out.len(), 20);
        assert!((out[10] - 2.0).abs() < 1e-12);
        // zero padding shrinks the edges
        assert!(out[0] < 2.0);
        assert!(out[19] < 2.0);
    }

    #[test]
    fn test_moving_rms_matches_same_mode_convolution() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = moving_rms(&x, 2);
        // window 2, offset 0: out[i] = sqrt((x[i-1]^2 + x[i]^2) / 2)
        assert!((out[0] - (1.0_f64 / 2.0).sqrt()).abs() < 1e-12);
        assert!((out[2] - ((4.0_f64 + 9.0) / 2.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_oscillator_deterministic() {
        let t = grid(1e-3, 2000);
        let stim = constant(&t, 0.0);
        let model = OscillatorDrive::default();
        let a = model
            .simulate(&t, &stim, &DriveParams::default(), &mut StdRng::seed_from_u64(3))
            .unwrap();
        let b = model
            .simulate(&t, &stim, &DriveParams::default(), &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(a.drive, b.drive);
        assert_eq!(a.band_power.as_ref().map(Vec::len), Some(2000));
    }

    #[test]
    fn test_stimulation_energy_suppresses_oscillation() {
        let t = grid(1e-3, 10_000);
        let model = OscillatorDrive::default();
        let patient = DriveParams::default();
        let off = model
            .simulate(&t, &constant(&t, 0.0), &patient, &mut StdRng::seed_from_u64(9))
            .unwrap();
        // Zero-mean square wave: energy without a DC push
        let alternating = Stimulation {
            channels: vec![(0..t.len()).map(|i| if i % 2 == 0 { 3.0 } else { -3.0 }).collect()],
        };
        let on = model
            .simulate(&t, &alternating, &patient, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert!(
            rms(&on.drive[2000..]) < rms(&off.drive[2000..]),
            "stimulation should damp the oscillation"
        );
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let t = grid(1e-3, 10);
        let stim = Stimulation {
            channels: vec![vec![0.0; 9]],
        };
        let err = OscillatorDrive::default()
            .simulate(&t, &stim, &DriveParams::default(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInputShape { .. }));
    }

    #[test]
    fn test_passthrough_averages_channels() {
        let t = grid(1e-3, 3);
        let stim = Stimulation {
            channels: vec![vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0]],
        };
        let latent = PassthroughDrive
            .simulate(&t, &stim, &DriveParams::default(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(latent.drive, vec![2.0, 2.0, 2.0]);
        assert!(latent.band_power.is_none());
    }
}
