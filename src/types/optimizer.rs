//! Optimizer output types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stim::{ParamBase, StimParams};
use crate::error::CoreResult;
use crate::optimizer::GaussianProcess;

/// Search interval for one flattened parameter column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub column: String,
    pub base: ParamBase,
    pub low: f64,
    pub high: f64,
}

impl ParamBounds {
    pub fn span(&self) -> f64 {
        self.high - self.low
    }
}

/// How the surrogate hyperparameters were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitOutcome {
    /// Marginal likelihood optimization converged inside the bounds
    Optimized,
    /// Optimization failed to converge; refit with fixed conservative hyperparameters
    Stabilized,
}

/// Where the suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// Too few scored rows (or no severity column): last observed row returned unchanged
    Fallback,
    /// Acquisition-ranked candidate from the fitted surrogate
    Surrogate,
}

/// Result of one `suggest` call.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerResult {
    /// Canonical flattened column names, one per entry of each parameter vector
    pub columns: Vec<String>,
    /// Best single candidate
    pub next_params: Vec<f64>,
    /// Diverse batch; the first entry equals `next_params`
    pub next_params_batch: Vec<Vec<f64>>,
    /// Bounds used for candidate sampling (`None` on fallback)
    pub bounds: Option<Vec<ParamBounds>>,
    pub source: SuggestionSource,
    pub fit_outcome: Option<FitOutcome>,
    /// Fitted surrogate (`None` on fallback)
    #[serde(skip)]
    pub surrogate: Option<GaussianProcess>,
}

impl OptimizerResult {
    pub fn is_fallback(&self) -> bool {
        self.source == SuggestionSource::Fallback
    }

    /// `next_params` keyed by column name.
    pub fn next_params_map(&self) -> BTreeMap<String, f64> {
        self.columns
            .iter()
            .cloned()
            .zip(self.next_params.iter().copied())
            .collect()
    }

    /// Decode the best candidate into validated stimulation parameters.
    pub fn next_stim_params(&self) -> CoreResult<StimParams> {
        StimParams::from_flat(&self.next_params)
    }

    /// Decode every batch entry.
    pub fn batch_stim_params(&self) -> CoreResult<Vec<StimParams>> {
        self.next_params_batch
            .iter()
            .map(|row| StimParams::from_flat(row))
            .collect()
    }
}
