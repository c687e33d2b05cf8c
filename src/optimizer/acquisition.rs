//! Acquisition scoring for minimisation.
//!
//! `EI(mu, sigma) = (y_best - mu) Phi(z) + sigma phi(z)`, `z = (y_best - mu) / sigma`,
//! and the ranking score is `EI + w * sigma`.

use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Expected improvement below `y_best`. Zero when `sigma` is zero.
pub fn expected_improvement(mu: f64, sigma: f64, y_best: f64) -> f64 {
    if sigma <= 0.0 || !sigma.is_finite() {
        return 0.0;
    }
    // standard normal parameters are always valid
    let Ok(std_normal) = Normal::new(0.0, 1.0) else {
        return 0.0;
    };
    let improvement = y_best - mu;
    let z = improvement / sigma;
    let ei = improvement * std_normal.cdf(z) + sigma * std_normal.pdf(z);
    // cancellation can leave a tiny negative value deep in the left tail
    ei.max(0.0)
}

/// Exploration-augmented score used to rank candidates.
pub fn acquisition_score(mu: f64, sigma: f64, y_best: f64, exploration_weight: f64) -> f64 {
    expected_improvement(mu, sigma, y_best) + exploration_weight * sigma
}
