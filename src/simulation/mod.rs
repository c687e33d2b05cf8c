//! Simulation Module
//!
//! Deterministic rollout of one stimulation setting on one synthetic patient.
//!
//! ## Pipeline
//!
//! `encode -> drive model -> transducer -> sensor`
//!
//! - [`waveform`]: per-channel pulse trains, reduced to the drive input
//! - [`drive`]: damped oscillator whose damping grows with stimulation energy
//! - [`transducer`]: three-axis spring-mass limb
//! - [`sensor`]: downsampling with noise, bias and drift
//!
//! Every random draw comes from one `StdRng` seeded by the caller, so equal
//! inputs and seed give bit-identical output.

pub mod drive;
pub mod sensor;
pub mod transducer;
pub mod waveform;

pub use drive::{build_drive_model, moving_rms, DriveModel, OscillatorDrive, PassthroughDrive};
pub use sensor::ImuSensor;
pub use transducer::SpringMassTransducer;
pub use waveform::{Stimulation, WaveformEncoder};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, warn};

use crate::config::defaults::ENERGY_BOUND;
use crate::config::TunerConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{MeasurementOutput, PatientParams, RolloutConfig, StimParams};

/// Encoder, drive model, transducer and sensor wired together.
pub struct Simulator {
    pub encoder: WaveformEncoder,
    pub drive: Box<dyn DriveModel>,
    pub transducer: SpringMassTransducer,
    pub sensor: ImuSensor,
    /// Largest admissible absolute position
    pub energy_bound: f64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::from_config(&TunerConfig::default())
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("encoder", &self.encoder)
            .field("drive", &self.drive.name())
            .field("energy_bound", &self.energy_bound)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    pub fn from_config(config: &TunerConfig) -> Self {
        Self {
            encoder: WaveformEncoder::from_config(&config.encoder),
            drive: build_drive_model(&config.drive),
            transducer: SpringMassTransducer::new(config.transducer.clone()),
            sensor: ImuSensor::new(config.sensor.clone()),
            energy_bound: ENERGY_BOUND,
        }
    }

    /// Run one rollout with a fresh `StdRng` seeded from `seed`.
    pub fn simulate(
        &self,
        params: &StimParams,
        patient: &PatientParams,
        rollout: &RolloutConfig,
        seed: u64,
    ) -> CoreResult<MeasurementOutput> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.simulate_with_rng(params, patient, rollout, &mut rng)
    }

    /// Run one rollout drawing from a caller-owned random source.
    ///
    /// Fails with `InvalidInputShape` on a malformed rollout config and with
    /// `Instability` when the trace is non-finite or leaves the energy bound.
    pub fn simulate_with_rng(
        &self,
        params: &StimParams,
        patient: &PatientParams,
        rollout: &RolloutConfig,
        rng: &mut dyn RngCore,
    ) -> CoreResult<MeasurementOutput> {
        rollout.check()?;
        let t = rollout.time_grid();

        let stimulation = self.encoder.encode(&t, params);
        let latent = self.drive.simulate(&t, &stimulation, &patient.drive, rng)?;
        let kin = self.transducer.simulate(&latent, &patient.transducer, rollout.dt)?;
        let output = self.sensor.observe(&kin, rollout, &patient.sensor, rng);

        self.check_stability(&output)?;
        debug!(
            channels = params.n_channels(),
            steps = t.len(),
            samples = output.len(),
            drive = self.drive.name(),
            "Rollout complete"
        );
        Ok(output)
    }

    fn check_stability(&self, output: &MeasurementOutput) -> CoreResult<()> {
        if !output.is_finite() {
            warn!("Rollout rejected: non-finite kinematics");
            return Err(CoreError::Instability {
                reason: "non-finite values in measurement output".to_string(),
            });
        }
        let peak = output.max_abs_position();
        if peak > self.energy_bound {
            warn!(peak, bound = self.energy_bound, "Rollout rejected: energy bound exceeded");
            return Err(CoreError::Instability {
                reason: format!("max |position| {peak:.3e} exceeds bound {:.3e}", self.energy_bound),
            });
        }
        Ok(())
    }
}
