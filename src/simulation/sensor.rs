//! Sensor model: downsampling plus noise, bias and drift.

use rand::RngCore;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::config::SensorConfig;
use crate::types::{KinematicState, MeasurementMeta, MeasurementOutput, RolloutConfig, SensorParams, Vec3};

#[derive(Debug, Clone, Default)]
pub struct ImuSensor {
    config: SensorConfig,
}

/// Index stride taking the integration grid to the sensor rate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sensor_stride(rollout: &RolloutConfig) -> usize {
    let target_dt = 1.0 / rollout.sample_rate_hz;
    ((target_dt / rollout.dt).round() as usize).max(1)
}

impl ImuSensor {
    pub fn new(config: SensorConfig) -> Self {
        Self { config }
    }

    /// Downsample `kin` to the rollout sensor rate and, when noise is
    /// enabled, perturb it.
    ///
    /// Random draws happen in a fixed order: bias (3), then position,
    /// velocity and acceleration noise, each sample-major.
    pub fn observe(
        &self,
        kin: &KinematicState,
        rollout: &RolloutConfig,
        patient: &SensorParams,
        rng: &mut dyn RngCore,
    ) -> MeasurementOutput {
        let stride = sensor_stride(rollout);
        let idx: Vec<usize> = (0..kin.t.len()).step_by(stride).collect();

        let t: Vec<f64> = idx.iter().map(|&i| kin.t[i]).collect();
        let mut pos: Vec<Vec3> = idx.iter().map(|&i| kin.pos[i]).collect();
        let mut vel: Vec<Vec3> = idx.iter().map(|&i| kin.vel[i]).collect();
        let mut acc: Vec<Vec3> = idx.iter().map(|&i| kin.acc[i]).collect();

        if rollout.include_noise {
            let cfg = &self.config;
            let noise_std = patient.noise_std.unwrap_or(cfg.noise_std);
            let bias_std = patient.bias_std.unwrap_or(cfg.bias_std);
            let drift = patient.drift_per_s.unwrap_or(cfg.drift_per_s);

            let bias: Vec3 = [
                gaussian(rng, bias_std),
                gaussian(rng, bias_std),
                gaussian(rng, bias_std),
            ];
            let t0 = t.first().copied().unwrap_or(0.0);

            for (p, &ti) in pos.iter_mut().zip(&t) {
                let drift_offset = (ti - t0) * drift;
                for (k, x) in p.iter_mut().enumerate() {
                    *x += gaussian(rng, noise_std) + bias[k] + drift_offset;
                }
            }
            for series in [&mut vel, &mut acc] {
                for sample in series.iter_mut() {
                    for x in sample.iter_mut() {
                        *x += gaussian(rng, noise_std);
                    }
                }
            }
        }

        let n_samples = t.len();
        MeasurementOutput {
            t,
            pos,
            vel,
            acc,
            meta: MeasurementMeta {
                schema_version: rollout.schema_version.clone(),
                sample_rate_hz: rollout.sample_rate_hz,
                n_samples,
            },
        }
    }
}

/// One zero-mean normal draw. A non-positive or non-finite std yields 0
/// but still consumes the draw, keeping the random stream aligned.
fn gaussian(rng: &mut dyn RngCore, std: f64) -> f64 {
    match Normal::new(0.0, std) {
        Ok(dist) if std > 0.0 => dist.sample(rng),
        _ => {
            let _: f64 = StandardNormal.sample(rng);
            0.0
        }
    }
}
