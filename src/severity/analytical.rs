//! Analytical severity: suppression of acceleration RMS against a
//! stimulation-off baseline run with the same noise seed.
//!
//! `severity = 1 - 2 * clamp((rms_off - rms_on) / rms_off, 0, 1)`
//!
//! The baseline depends only on the patient, the seed, the channel count and
//! the rollout grid, so it is computed once per key and shared.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::config::defaults::BASELINE_RMS_FLOOR;
use crate::error::CoreResult;
use crate::simulation::Simulator;
use crate::types::{PatientParams, RolloutConfig, StimParams};

/// Map a stimulated/baseline RMS pair to a severity in [-1, 1].
///
/// A baseline at or below [`BASELINE_RMS_FLOOR`] has nothing to suppress and
/// scores +1 whatever the stimulated run does.
pub fn suppression_severity(rms_stim: f64, rms_baseline: f64) -> f64 {
    if rms_baseline.is_nan() || rms_baseline <= BASELINE_RMS_FLOOR {
        return 1.0;
    }
    let suppression = ((rms_baseline - rms_stim) / rms_baseline).clamp(0.0, 1.0);
    if suppression.is_nan() {
        return 1.0;
    }
    1.0 - 2.0 * suppression
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaselineKey {
    pub patient: String,
    pub seed: u64,
    pub n_channels: usize,
    pub duration_bits: u64,
    pub dt_bits: u64,
}

impl BaselineKey {
    pub fn new(patient: &PatientParams, seed: u64, n_channels: usize, rollout: &RolloutConfig) -> Self {
        Self {
            patient: patient.cache_key(),
            seed,
            n_channels,
            duration_bits: rollout.duration_s.to_bits(),
            dt_bits: rollout.dt.to_bits(),
        }
    }
}

/// Baseline RMS values shared across threads.
///
/// Each key owns its own slot lock. The map's shard lock is held only long
/// enough to fetch the slot, so a miss simulates the baseline while blocking
/// callers of the same key and nobody else. Concurrent callers with the same
/// key run the simulation once and all observe the same value.
#[derive(Debug, Default)]
pub struct BaselineCache {
    entries: DashMap<BaselineKey, Arc<Mutex<Option<f64>>>>,
}

impl BaselineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys holding a computed baseline.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|slot| slot.value().lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn get(&self, key: &BaselineKey) -> Option<f64> {
        let slot = self.entries.get(key).map(|slot| Arc::clone(slot.value()))?;
        let value = *slot.lock().unwrap_or_else(PoisonError::into_inner);
        value
    }

    /// Cached value for `key`, or the result of `compute` stored under it.
    /// Errors are returned without populating the entry.
    pub fn get_or_try_insert<F>(&self, key: BaselineKey, compute: F) -> CoreResult<f64>
    where
        F: FnOnce() -> CoreResult<f64>,
    {
        let slot = Arc::clone(self.entries.entry(key.clone()).or_default().value());
        let mut value = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = *value {
            debug!(patient = %key.patient, seed = key.seed, "Baseline cache hit");
            return Ok(hit);
        }
        debug!(patient = %key.patient, seed = key.seed, "Baseline cache miss, simulating stimulation-off rollout");
        let computed = compute()?;
        *value = Some(computed);
        Ok(computed)
    }
}

/// Baseline RMS for `params`' channel layout, through the cache when given.
pub fn baseline_rms(
    simulator: &Simulator,
    params: &StimParams,
    patient: &PatientParams,
    rollout: &RolloutConfig,
    seed: u64,
    cache: Option<&BaselineCache>,
) -> CoreResult<f64> {
    let compute = || {
        simulator
            .simulate(&params.zero_amplitude(), patient, rollout, seed)
            .map(|out| out.acc_magnitude_rms())
    };
    match cache {
        Some(cache) => {
            let key = BaselineKey::new(patient, seed, params.n_channels(), rollout);
            cache.get_or_try_insert(key, compute)
        }
        None => compute(),
    }
}

/// Analytical severity of `params` on `patient`.
pub fn analytical_severity(
    simulator: &Simulator,
    params: &StimParams,
    patient: &PatientParams,
    rollout: &RolloutConfig,
    seed: u64,
    cache: Option<&BaselineCache>,
) -> CoreResult<f64> {
    let rms_baseline = baseline_rms(simulator, params, patient, rollout, seed, cache)?;
    let rms_stim = simulator
        .simulate(params, patient, rollout, seed)?
        .acc_magnitude_rms();
    let severity = suppression_severity(rms_stim, rms_baseline);
    debug!(rms_baseline, rms_stim, severity, "Analytical severity");
    Ok(severity)
}
