//! Peripheral transducer: three-axis spring-mass limb driven by the latent drive.

use std::f64::consts::TAU;

use crate::config::defaults::TRANSDUCER_MIX_PAD;
use crate::config::TransducerConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{KinematicState, LatentState, TransducerParams, Vec3};

/// Diagonal second-order system matrices `(A, B)` for `acc = A pos + B vel`.
///
/// `A = -omega^2 I`, `B = -2 zeta omega I`, both negative definite for
/// positive frequency and damping, so the free system always decays.
pub fn stable_second_order(freq_hz: f64, damping: f64) -> (Vec3, Vec3) {
    let omega = TAU * freq_hz;
    let a = -omega * omega;
    let b = -2.0 * damping * omega;
    ([a; 3], [b; 3])
}

/// Truncate or pad a mix vector to exactly three axes.
pub fn resolve_mix(mix: &[f64]) -> Vec3 {
    let mut out = [TRANSDUCER_MIX_PAD; 3];
    for (slot, &m) in out.iter_mut().zip(mix) {
        *slot = m;
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct SpringMassTransducer {
    config: TransducerConfig,
}

impl SpringMassTransducer {
    pub fn new(config: TransducerConfig) -> Self {
        Self { config }
    }

    /// Integrate the limb over the latent drive with step `dt`.
    ///
    /// Explicit scheme: `acc[i-1]` from the previous state, then
    /// `vel[i] = vel[i-1] + dt acc[i-1]` and `pos[i] = pos[i-1] + dt vel[i]`.
    /// The final acceleration repeats the one before it.
    pub fn simulate(
        &self,
        latent: &LatentState,
        patient: &TransducerParams,
        dt: f64,
    ) -> CoreResult<KinematicState> {
        let n = latent.t.len();
        if latent.drive.len() != n {
            return Err(CoreError::shape(
                "transducer drive",
                format!("{n} samples"),
                format!("{} samples", latent.drive.len()),
            ));
        }

        let cfg = &self.config;
        let freq = patient.freq_hz.unwrap_or(cfg.freq_hz);
        let damping = patient
            .damping
            .unwrap_or(cfg.damping)
            .max(cfg.damping_floor);
        let gain = patient.gain.unwrap_or(cfg.gain);
        let mix = resolve_mix(patient.mix.as_deref().unwrap_or(&cfg.mix));
        let (a_diag, b_diag) = stable_second_order(freq, damping);

        let mut pos = vec![[0.0; 3]; n];
        let mut vel = vec![[0.0; 3]; n];
        let mut acc = vec![[0.0; 3]; n];

        for i in 1..n {
            let forcing = gain * latent.drive[i - 1];
            for k in 0..3 {
                acc[i - 1][k] = a_diag[k] * pos[i - 1][k] + b_diag[k] * vel[i - 1][k] + mix[k] * forcing;
                vel[i][k] = vel[i - 1][k] + dt * acc[i - 1][k];
                pos[i][k] = pos[i - 1][k] + dt * vel[i][k];
            }
        }
        if n > 1 {
            acc[n - 1] = acc[n - 2];
        }

        Ok(KinematicState {
            t: latent.t.clone(),
            pos,
            vel,
            acc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latent(drive: Vec<f64>, dt: f64) -> LatentState {
        let t: Vec<f64> = (0..drive.len()).map(|i| i as f64 * dt).collect();
        LatentState {
            t,
            drive_in: drive.clone(),
            drive,
            band_power: None,
        }
    }

    #[test]
    fn test_resolve_mix_truncates_and_pads() {
        assert_eq!(resolve_mix(&[1.0, 2.0, 3.0, 4.0]), [1.0, 2.0, 3.0]);
        assert_eq!(resolve_mix(&[0.5]), [0.5, 0.1, 0.1]);
        assert_eq!(resolve_mix(&[]), [0.1, 0.1, 0.1]);
    }

    #[test]
    fn test_matrices_are_stable() {
        let (a, b) = stable_second_order(4.5, 0.7);
        assert!(a.iter().all(|&x| x < 0.0));
        assert!(b.iter().all(|&x| x < 0.0));
    }

    #[test]
    fn test_zero_drive_stays_at_rest() {
        let kin = SpringMassTransducer::default()
            .simulate(&latent(vec![0.0; 100], 1e-3), &TransducerParams::default(), 1e-3)
            .unwrap();
        assert!(kin.pos.iter().all(|p| p == &[0.0; 3]));
    }

    #[test]
    fn test_step_drive_settles_with_axis_mix() {
        // DC drive of 1: static deflection = gain * mix / omega^2
        let dt = 1e-3;
        let kin = SpringMassTransducer::default()
            .simulate(&latent(vec![1.0; 10_000], dt), &TransducerParams::default(), dt)
            .unwrap();
        let omega = TAU * 4.5;
        let last = kin.pos[kin.pos.len() - 1];
        assert!((last[0] - 1.0 / (omega * omega)).abs() < 1e-4);
        assert!(last[0] > last[1] && last[1] > last[2]);
        assert_eq!(kin.acc[9_999], kin.acc[9_998]);
    }

    #[test]
    fn test_damping_floor_applied() {
        let patient = TransducerParams {
            damping: Some(-1.0),
            ..TransducerParams::default()
        };
        let dt = 1e-3;
        let kin = SpringMassTransducer::default()
            .simulate(&latent(vec![1.0; 5_000], dt), &patient, dt)
            .unwrap();
        assert!(kin.pos.iter().all(|p| p.iter().all(|x| x.is_finite())));
    }
}
