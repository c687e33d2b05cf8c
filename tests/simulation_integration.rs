//! Simulator Integration Tests
//!
//! End-to-end rollouts through encoder, drive, transducer and sensor.

use rand::rngs::StdRng;
use rand::SeedableRng;

use stimtune::cohort::{sample_patient, sample_patients};
use stimtune::config::defaults::ENERGY_BOUND;
use stimtune::config::TunerConfig;
use stimtune::severity::sweep::sample_params;
use stimtune::simulation::Simulator;
use stimtune::types::{PatientParams, RolloutConfig, StimParams};

fn two_channel() -> StimParams {
    StimParams::from_matrix(&[
        vec![1.0, 1.0],
        vec![120.0, 80.0],
        vec![60e-6, 60e-6],
        vec![0.0, 1.0],
    ])
    .expect("valid params")
}

fn one_second() -> RolloutConfig {
    RolloutConfig::default().with_duration(1.0)
}

#[test]
fn same_seed_gives_identical_rollouts() {
    let sim = Simulator::default();
    let patient = PatientParams::default();
    let a = sim.simulate(&two_channel(), &patient, &one_second(), 42).expect("rollout");
    let b = sim.simulate(&two_channel(), &patient, &one_second(), 42).expect("rollout");

    assert!(!a.is_empty());
    assert_eq!(a.pos.len(), a.vel.len());
    assert_eq!(a.vel.len(), a.acc.len());
    assert_eq!(a.t.len(), a.pos.len());
    assert_eq!(a, b, "equal seeds must give bit-identical output");
}

#[test]
fn different_seeds_differ() {
    let sim = Simulator::default();
    let patient = PatientParams::default();
    let a = sim.simulate(&two_channel(), &patient, &one_second(), 1).expect("rollout");
    let b = sim.simulate(&two_channel(), &patient, &one_second(), 2).expect("rollout");
    assert_ne!(a.acc, b.acc);
}

#[test]
fn metadata_matches_rollout() {
    let sim = Simulator::default();
    let out = sim
        .simulate(&two_channel(), &PatientParams::default(), &one_second(), 7)
        .expect("rollout");
    assert_eq!(out.meta.n_samples, out.len());
    assert_eq!(out.meta.schema_version, "sim.v1");
    assert!((out.meta.sample_rate_hz - 100.0).abs() < 1e-12);
    assert_eq!(out.to_nine_channel().len(), out.len());
}

#[test]
fn rollouts_stay_inside_energy_bound() {
    let config = TunerConfig::default();
    let sim = Simulator::from_config(&config);
    let rollout = RolloutConfig::default().with_duration(5.0);
    let mut rng = StdRng::seed_from_u64(2024);
    let patients = sample_patients(&mut rng, 5, None);

    for (i, patient) in patients.iter().enumerate() {
        for j in 0..4 {
            let params = sample_params(&mut rng, 1 + j % 3).expect("documented bounds");
            let out = sim
                .simulate(&params, patient, &rollout, (i * 10 + j) as u64)
                .unwrap_or_else(|e| panic!("patient {i} draw {j} unstable: {e}"));
            let peak = out.max_abs_position();
            assert!(peak.is_finite() && peak < ENERGY_BOUND, "peak {peak} out of bound");
        }
    }
}

#[test]
fn stimulation_off_matches_zero_amplitude() {
    let sim = Simulator::default();
    let mut rng = StdRng::seed_from_u64(5);
    let patient = sample_patient(&mut rng, None);
    let off = two_channel().zero_amplitude();
    let out = sim.simulate(&off, &patient, &one_second(), 3).expect("rollout");
    assert!(out.acc_magnitude_rms() > 0.0, "tremor persists without stimulation");
}

#[test]
fn full_length_rollout_at_upper_bounds_stays_inside_energy_bound() {
    let sim = Simulator::from_config(&TunerConfig::default());
    let rollout = RolloutConfig::default().with_duration(300.0);
    let params = StimParams::from_matrix(&[
        vec![5.0; 4],
        vec![200.0; 4],
        vec![2e-4; 4],
        vec![0.0, 1.5, 3.0, 6.0],
    ])
    .expect("upper documented bounds");

    let mut rng = StdRng::seed_from_u64(300);
    let mut patients = vec![PatientParams::default()];
    patients.extend(sample_patients(&mut rng, 2, None));

    for (i, patient) in patients.iter().enumerate() {
        for seed in 0..3 {
            let out = sim
                .simulate(&params, patient, &rollout, seed)
                .unwrap_or_else(|e| panic!("patient {i} seed {seed} unstable: {e}"));
            let peak = out.max_abs_position();
            assert!(peak.is_finite() && peak < ENERGY_BOUND, "peak {peak} out of bound");
        }
    }
}
