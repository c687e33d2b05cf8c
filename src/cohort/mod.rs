//! Cohort Sampler
//!
//! Draws synthetic patients from fixed population distributions. Every draw
//! passes through a clamp so the physics never sees a non-positive
//! frequency or damping.
//!
//! | Parameter                | Distribution                | Guard            |
//! |--------------------------|-----------------------------|------------------|
//! | drive natural freq (Hz)  | N(5, 1)                     | [2.5, 9]         |
//! | drive damping            | LogN(-0.2, 0.4)             | [0.05, 3]        |
//! | drive coupling           | N(0.8, 0.2)                 | >= 0.1           |
//! | limb freq (Hz)           | N(4.5, 0.8)                 | [2, 8]           |
//! | limb damping             | LogN(-0.3, 0.4)             | [0.05, 3]        |
//! | limb gain                | N(1, 0.2)                   | >= 0.2           |
//! | axis mix                 | N([1, 0.6, 0.3], 0.2)       | none             |
//! | sensor noise std         | LogN(-3.8, 0.3)             | >= 1e-3          |
//! | sensor bias std          | LogN(-4.2, 0.3)             | >= 5e-4          |
//! | sensor drift (1/s)       | LogN(-6, 0.5)               | >= 1e-5          |

use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal};
use tracing::debug;

use crate::types::{DriveParams, PatientParams, SensorParams, TransducerParams, TreatmentGoals};

/// Damping ratios are kept inside this interval.
pub const STABLE_DAMPING: (f64, f64) = (0.05, 3.0);

pub fn positive(x: f64, minimum: f64) -> f64 {
    x.max(minimum)
}

pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

pub fn stable_damping(x: f64) -> f64 {
    clamp(x, STABLE_DAMPING.0, STABLE_DAMPING.1)
}

// Parameters are literals, so construction cannot fail.
fn normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std: f64) -> f64 {
    Normal::new(mean, std).map_or(mean, |d| d.sample(rng))
}

fn lognormal<R: Rng + ?Sized>(rng: &mut R, mu: f64, sigma: f64) -> f64 {
    LogNormal::new(mu, sigma).map_or(mu.exp(), |d| d.sample(rng))
}

/// Draw one patient. Draw order is fixed: drive, limb, sensor.
pub fn sample_patient<R: Rng + ?Sized>(rng: &mut R, goals: Option<&TreatmentGoals>) -> PatientParams {
    let drive = DriveParams {
        natural_freq_hz: Some(clamp(normal(rng, 5.0, 1.0), 2.5, 9.0)),
        damping: Some(stable_damping(lognormal(rng, -0.2, 0.4))),
        coupling: Some(positive(normal(rng, 0.8, 0.2), 0.1)),
        inhibition: None,
        drive_noise_std: None,
    };
    let transducer = TransducerParams {
        freq_hz: Some(clamp(normal(rng, 4.5, 0.8), 2.0, 8.0)),
        damping: Some(stable_damping(lognormal(rng, -0.3, 0.4))),
        gain: Some(positive(normal(rng, 1.0, 0.2), 0.2)),
        mix: Some(vec![
            normal(rng, 1.0, 0.2),
            normal(rng, 0.6, 0.2),
            normal(rng, 0.3, 0.2),
        ]),
    };
    let sensor = SensorParams {
        noise_std: Some(positive(lognormal(rng, -3.8, 0.3), 0.001)),
        bias_std: Some(positive(lognormal(rng, -4.2, 0.3), 0.0005)),
        drift_per_s: Some(positive(lognormal(rng, -6.0, 0.5), 1e-5)),
    };

    PatientParams {
        id: None,
        drive,
        transducer,
        sensor,
        treatment_goals: goals.cloned(),
    }
}

/// Draw `n` patients from one random stream.
pub fn sample_patients<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    goals: Option<&TreatmentGoals>,
) -> Vec<PatientParams> {
    let patients: Vec<PatientParams> = (0..n).map(|_| sample_patient(rng, goals)).collect();
    debug!(n, with_goals = goals.is_some(), "Sampled cohort");
    patients
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_transforms() {
        assert_eq!(positive(-1.0, 0.1), 0.1);
        assert_eq!(clamp(10.0, 2.0, 8.0), 8.0);
        assert_eq!(stable_damping(0.0), 0.05);
        assert_eq!(stable_damping(1.2), 1.2);
    }

    #[test]
    fn test_samples_respect_guards() {
        let mut rng = StdRng::seed_from_u64(11);
        for p in sample_patients(&mut rng, 500, None) {
            let f = p.drive.natural_freq_hz.unwrap();
            assert!((2.5..=9.0).contains(&f));
            let zd = p.drive.damping.unwrap();
            assert!((0.05..=3.0).contains(&zd));
            assert!(p.drive.coupling.unwrap() >= 0.1);
            assert!((2.0..=8.0).contains(&p.transducer.freq_hz.unwrap()));
            assert!((0.05..=3.0).contains(&p.transducer.damping.unwrap()));
            assert!(p.transducer.gain.unwrap() >= 0.2);
            assert_eq!(p.transducer.mix.as_ref().map(Vec::len), Some(3));
            assert!(p.sensor.noise_std.unwrap() >= 0.001);
            assert!(p.sensor.bias_std.unwrap() >= 0.0005);
            assert!(p.sensor.drift_per_s.unwrap() >= 1e-5);
            assert!(p.treatment_goals.is_none());
        }
    }

    #[test]
    fn test_sampling_is_seeded() {
        let a = sample_patient(&mut StdRng::seed_from_u64(4), None);
        let b = sample_patient(&mut StdRng::seed_from_u64(4), None);
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_goals_attached_to_every_patient() {
        let goals = TreatmentGoals::motor_focused();
        let patients = sample_patients(&mut StdRng::seed_from_u64(1), 3, Some(&goals));
        assert!(patients.iter().all(|p| p.treatment_goals.as_ref() == Some(&goals)));
        // distinct physiology gives distinct cache keys
        assert_ne!(patients[0].cache_key(), patients[1].cache_key());
    }
}
