//! Severity Evaluator
//!
//! Scores stimulation parameters into a scalar loss in [-1, 1]; lower is
//! better.
//!
//! ## Backends
//!
//! - **analytical**: acceleration RMS suppression against a stimulation-off
//!   baseline simulated with the same noise seed ([`analytical`])
//! - **regression**: pre-trained window regressor on the nine-channel IMU
//!   signal ([`regression`])
//! - **composite**: either motor score blended with non-motor, disease
//!   duration and speech components by treatment goals ([`composite`])
//!
//! The evaluator owns its simulator and baseline cache and borrows a
//! regression model handed in by the caller. It holds no global state and is
//! `Sync`, so one instance can score a batch from several threads.

pub mod analytical;
pub mod composite;
pub mod regression;
pub mod sweep;

pub use analytical::{analytical_severity, suppression_severity, BaselineCache, BaselineKey};
pub use composite::{composite_severity, DurationScale};
pub use regression::{make_windows, ChannelNorm, RegressorModel};
pub use sweep::{run_sweep, SummaryStats, SweepReport, SweepSettings};

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

use crate::cohort::sample_patient;
use crate::config::{MotorBackend, SeverityBackend, SeverityConfig, TunerConfig};
use crate::error::{CoreError, CoreResult};
use crate::simulation::Simulator;
use crate::types::{
    MeasurementOutput, PatientContext, PatientParams, RolloutConfig, StimParams, TreatmentGoals,
};

#[derive(Debug)]
pub struct SeverityEvaluator {
    config: SeverityConfig,
    seed: u64,
    rollout: RolloutConfig,
    simulator: Simulator,
    goals: Option<TreatmentGoals>,
    model: Option<Arc<RegressorModel>>,
    baseline: BaselineCache,
}

impl SeverityEvaluator {
    /// Build from config with a caller-provided model.
    ///
    /// Backends that need a regressor fail with `ModelNotFound` when `model`
    /// is `None`.
    pub fn new(config: &TunerConfig, model: Option<Arc<RegressorModel>>) -> CoreResult<Self> {
        let severity = config.severity.clone();
        if Self::needs_model(&severity) && model.is_none() {
            return Err(CoreError::ModelNotFound(
                severity.model_path.clone().unwrap_or_default(),
            ));
        }
        Ok(Self {
            rollout: config.rollout_config().with_duration(severity.rollout_duration_s),
            seed: config.seed,
            simulator: Simulator::from_config(config),
            goals: config.cohort.treatment_goals.clone(),
            model,
            baseline: BaselineCache::new(),
            config: severity,
        })
    }

    /// Build from config, loading `severity.model_path` when the backend needs it.
    pub fn from_config(config: &TunerConfig) -> CoreResult<Self> {
        let model = if Self::needs_model(&config.severity) {
            let path = config
                .severity
                .model_path
                .clone()
                .ok_or_else(|| CoreError::ModelNotFound(Default::default()))?;
            Some(Arc::new(RegressorModel::load(&path)?))
        } else {
            None
        };
        Self::new(config, model)
    }

    fn needs_model(config: &SeverityConfig) -> bool {
        match config.backend {
            SeverityBackend::Regression => true,
            SeverityBackend::Composite => config.motor_backend == MotorBackend::Regression,
            SeverityBackend::Analytical => false,
        }
    }

    pub fn backend(&self) -> SeverityBackend {
        self.config.backend
    }

    pub fn rollout(&self) -> &RolloutConfig {
        &self.rollout
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn baseline_cache(&self) -> &BaselineCache {
        &self.baseline
    }

    /// Same evaluator with a different rollout duration. The baseline cache
    /// key includes the duration, so cached values stay valid.
    #[must_use]
    pub fn with_rollout_duration(mut self, duration_s: f64) -> Self {
        self.rollout = self.rollout.with_duration(duration_s);
        self
    }

    /// The cohort patient for `seed`, carrying the configured treatment goals.
    pub fn patient_for_seed(&self, seed: u64) -> PatientParams {
        let mut rng = StdRng::seed_from_u64(seed);
        sample_patient(&mut rng, self.goals.as_ref())
    }

    /// Seed used to score `params`: the configured seed, or with
    /// `vary_patient` a hash of the seed and the parameter bits.
    pub fn seed_for(&self, params: &StimParams) -> u64 {
        if !self.config.vary_patient {
            return self.seed;
        }
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        for row in params.as_matrix() {
            for v in row {
                v.to_bits().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Severity of `params` on the cohort patient.
    pub fn evaluate(&self, params: &StimParams, context: Option<&PatientContext>) -> CoreResult<f64> {
        self.evaluate_with_seed(params, self.seed_for(params), context)
    }

    /// Severity of a raw `4 x N` parameter matrix.
    pub fn evaluate_matrix(&self, rows: &[Vec<f64>], context: Option<&PatientContext>) -> CoreResult<f64> {
        if rows.len() != 4 || rows[0].is_empty() {
            return Err(CoreError::shape(
                "severity parameter matrix",
                "4 x N with N > 0",
                format!("{} x {}", rows.len(), rows.first().map_or(0, Vec::len)),
            ));
        }
        let params = StimParams::from_matrix(rows)?;
        self.evaluate(&params, context)
    }

    /// Severity on the patient sampled from `seed`, simulated with the same seed.
    pub fn evaluate_with_seed(
        &self,
        params: &StimParams,
        seed: u64,
        context: Option<&PatientContext>,
    ) -> CoreResult<f64> {
        let patient = self.patient_for_seed(seed);
        self.evaluate_for_patient(params, &patient, seed, context)
    }

    /// Severity of `params` on an explicit patient.
    pub fn evaluate_for_patient(
        &self,
        params: &StimParams,
        patient: &PatientParams,
        seed: u64,
        context: Option<&PatientContext>,
    ) -> CoreResult<f64> {
        let severity = match self.config.backend {
            SeverityBackend::Analytical => self.analytical(params, patient, seed)?,
            SeverityBackend::Regression => self.regression(params, patient, seed)?,
            SeverityBackend::Composite => {
                let motor = match self.config.motor_backend {
                    MotorBackend::Analytical => self.analytical(params, patient, seed)?,
                    MotorBackend::Regression => self.regression(params, patient, seed)?,
                };
                let goals = patient.treatment_goals.clone().unwrap_or_default();
                composite_severity(motor, &goals, context, self.duration_scale())
            }
        };
        debug!(
            backend = ?self.config.backend,
            patient = %patient.cache_key(),
            channels = params.n_channels(),
            severity,
            "Evaluated severity"
        );
        Ok(severity)
    }

    /// Regression score of an already simulated rollout.
    pub fn score_rollout(&self, output: &MeasurementOutput) -> CoreResult<f64> {
        let model = self.model()?;
        model.score(output, self.config.window, self.config.stride)
    }

    fn model(&self) -> CoreResult<&RegressorModel> {
        self.model.as_deref().ok_or_else(|| {
            CoreError::ModelNotFound(self.config.model_path.clone().unwrap_or_default())
        })
    }

    fn analytical(&self, params: &StimParams, patient: &PatientParams, seed: u64) -> CoreResult<f64> {
        let cache = self.config.cache_baseline.then_some(&self.baseline);
        analytical_severity(&self.simulator, params, patient, &self.rollout, seed, cache)
    }

    fn regression(&self, params: &StimParams, patient: &PatientParams, seed: u64) -> CoreResult<f64> {
        let output = self.simulator.simulate(params, patient, &self.rollout, seed)?;
        self.score_rollout(&output)
    }

    fn duration_scale(&self) -> DurationScale {
        DurationScale {
            mu_years: self.config.duration_mu_years,
            sigma_years: self.config.duration_sigma_years,
        }
    }
}
