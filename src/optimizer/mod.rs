//! Bayesian Optimizer
//!
//! Proposes the next stimulation parameters from the observation history.
//!
//! ## Flow of one `suggest` call
//!
//! 1. Keep the most recent `window` rows
//! 2. Build canonical features: dedup identical rows, impute missing cells
//! 3. Too few scored rows: return the last row unchanged
//! 4. Standardise features and target, fit the GP surrogate
//! 5. Infer the search box, draw uniform candidates
//! 6. Score candidates with `EI + w * sigma`, select a diverse batch
//!
//! A call is a pure function of the history and config: the candidate
//! generator is seeded from `random_state`.

pub mod acquisition;
pub mod bounds;
pub mod features;
pub mod gp;
pub mod scaler;
pub mod selection;

pub use acquisition::{acquisition_score, expected_improvement};
pub use bounds::infer_bounds;
pub use features::{build_features, FeatureMatrix};
pub use gp::{GaussianProcess, Hyperparameters};
pub use scaler::{StandardScaler, TargetScaler};
pub use selection::{select_batch, CandidatePool, Selection};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::OptimizerConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{
    canonical_columns, HistoryTable, ObservationRecord, OptimizerResult, ParamBounds, SuggestionSource,
    PARAMS_PER_CHANNEL,
};

/// Suggest from a history table.
///
/// A table read without a severity column always falls back.
pub fn suggest_table(table: &HistoryTable, config: &OptimizerConfig) -> CoreResult<OptimizerResult> {
    if !table.has_severity_column {
        let window = table.tail(config.window.max(1));
        let last = window.last().ok_or(CoreError::EmptyHistory)?;
        info!("History has no severity column, returning last row");
        return Ok(fallback(last, features::feature_width(window)));
    }
    suggest(&table.records, config)
}

/// Propose `config.batch_size` candidates from `history`.
pub fn suggest(history: &[ObservationRecord], config: &OptimizerConfig) -> CoreResult<OptimizerResult> {
    // 1. Window
    let start = history.len().saturating_sub(config.window.max(1));
    let window = &history[start..];
    let last = window.last().ok_or(CoreError::EmptyHistory)?;

    // 2. Features
    let features = build_features(window);
    debug!(
        rows = window.len(),
        unique_scored = features.n_rows(),
        columns = features.n_cols(),
        "Built feature matrix"
    );

    // 3. Small-sample fallback
    if features.n_rows() < config.fallback_min_samples.max(1) {
        info!(
            scored = features.n_rows(),
            required = config.fallback_min_samples,
            "Too few observations for a surrogate, returning last row"
        );
        return Ok(fallback(last, features::feature_width(window)));
    }

    // 4. Surrogate
    let x_scaler = StandardScaler::fit(&features.x);
    let y_scaler = TargetScaler::fit(&features.y);
    let xs = x_scaler.transform(&features.x);
    let ys = y_scaler.transform(&features.y);
    let mut rng = StdRng::seed_from_u64(config.random_state);
    let gp = GaussianProcess::fit(&xs, &ys, &mut rng)?;

    // 5. Candidates, drawn from a fresh stream so the pool does not depend
    // on how many draws the fit consumed
    let bounds = infer_bounds(&features.columns, &features.x, config);
    let candidates = draw_candidates(&bounds, config.n_candidates.max(1), config.random_state);

    // 6. Score and select
    let y_best = features.y.iter().copied().fold(f64::INFINITY, f64::min);
    let scores: Vec<f64> = candidates
        .iter()
        .map(|c| {
            let (mu_s, sigma_s) = gp.predict(&x_scaler.transform_row(c));
            let (mu, sigma) = y_scaler.inverse(mu_s, sigma_s);
            acquisition_score(mu, sigma, y_best, config.exploration_weight)
        })
        .collect();

    let observed: Vec<Vec<f64>> = features
        .x
        .iter()
        .map(|row| selection::normalize(row, &bounds))
        .collect();
    let pool = CandidatePool::new(candidates, scores, &bounds);
    let picked = select_batch(&pool, &observed, config.batch_size, config.min_distance_frac);
    if picked.relaxed {
        warn!(
            batch_size = config.batch_size,
            min_distance = config.min_distance_frac,
            "Diversity constraint relaxed to fill the batch"
        );
    }

    let batch: Vec<Vec<f64>> = picked.indices.iter().map(|&i| pool.points[i].clone()).collect();
    let next_params = batch.first().cloned().unwrap_or_default();
    info!(
        batch = batch.len(),
        best_score = picked.indices.first().map(|&i| pool.scores[i]),
        y_best,
        fit = ?gp.outcome(),
        "Suggested next parameters"
    );

    Ok(OptimizerResult {
        columns: features.columns,
        next_params,
        next_params_batch: batch,
        bounds: Some(bounds),
        source: SuggestionSource::Surrogate,
        fit_outcome: Some(gp.outcome()),
        surrogate: Some(gp),
    })
}

/// Uniform draws inside `bounds`, candidate-major.
pub fn draw_candidates(bounds: &[ParamBounds], n: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            bounds
                .iter()
                .map(|b| {
                    if b.high > b.low {
                        rng.gen_range(b.low..b.high)
                    } else {
                        b.low
                    }
                })
                .collect()
        })
        .collect()
}

/// Last row as the suggestion, padded with `NaN` to the window's width.
fn fallback(last: &ObservationRecord, width: usize) -> OptimizerResult {
    let params = features::padded(&last.params, width.max(last.params.len()));
    OptimizerResult {
        columns: canonical_columns(params.len().div_ceil(PARAMS_PER_CHANNEL)),
        next_params: params.clone(),
        next_params_batch: vec![params],
        bounds: None,
        source: SuggestionSource::Fallback,
        fit_outcome: None,
        surrogate: None,
    }
}
