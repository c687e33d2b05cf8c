//! Gaussian-process surrogate with an ARD Matérn-5/2 kernel plus white noise.
//!
//! ```text
//! k(a, b) = s2 (1 + sqrt5 r + 5/3 r^2) exp(-sqrt5 r) + noise [a == b]
//! r^2     = sum_d ((a_d - b_d) / l_d)^2
//! ```
//!
//! Hyperparameters `(s2, l_1..l_D, noise)` are fitted by maximising the log
//! marginal likelihood with projected gradient ascent in log space, from the
//! initial point plus a number of random log-uniform restarts. A fit that
//! runs out of iterations, hits a non positive-definite covariance, or ends
//! with a hyperparameter on its bound is discarded and replaced by a fit
//! with fixed conservative hyperparameters.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::Rng;
use std::f64::consts::PI;
use tracing::{debug, info};

use crate::config::defaults::{
    GP_GRADIENT_TOL, GP_INITIAL, GP_JITTER, GP_LENGTH_SCALE_BOUNDS, GP_MAX_ITERATIONS,
    GP_NOISE_BOUNDS, GP_RESTARTS, GP_SIGNAL_VARIANCE_BOUNDS, GP_STABILIZED,
};
use crate::error::{CoreError, CoreResult};
use crate::types::FitOutcome;

const SQRT_5: f64 = 2.236_067_977_499_79;

/// Relative objective change treated as convergence.
const OBJECTIVE_TOL: f64 = 1e-9;

/// Armijo sufficient-increase constant.
const ARMIJO_C: f64 = 1e-4;

const MAX_BACKTRACKS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
    pub signal_variance: f64,
    pub length_scales: Vec<f64>,
    pub noise: f64,
}

impl Hyperparameters {
    /// Same length scale on every dimension.
    pub fn isotropic(dims: usize, (signal_variance, length_scale, noise): (f64, f64, f64)) -> Self {
        Self {
            signal_variance,
            length_scales: vec![length_scale; dims],
            noise,
        }
    }

    fn to_log(&self) -> Vec<f64> {
        let mut theta = Vec::with_capacity(self.length_scales.len() + 2);
        theta.push(self.signal_variance.ln());
        theta.extend(self.length_scales.iter().map(|l| l.ln()));
        theta.push(self.noise.ln());
        theta
    }

    fn from_log(theta: &[f64]) -> Self {
        let last = theta.len() - 1;
        Self {
            signal_variance: theta[0].exp(),
            length_scales: theta[1..last].iter().map(|t| t.exp()).collect(),
            noise: theta[last].exp(),
        }
    }
}

/// Log-space box for `[s2, l_1..l_D, noise]`.
fn log_bounds(dims: usize) -> (Vec<f64>, Vec<f64>) {
    let mut lo = vec![GP_SIGNAL_VARIANCE_BOUNDS.0.ln()];
    let mut hi = vec![GP_SIGNAL_VARIANCE_BOUNDS.1.ln()];
    lo.extend(std::iter::repeat(GP_LENGTH_SCALE_BOUNDS.0.ln()).take(dims));
    hi.extend(std::iter::repeat(GP_LENGTH_SCALE_BOUNDS.1.ln()).take(dims));
    lo.push(GP_NOISE_BOUNDS.0.ln());
    hi.push(GP_NOISE_BOUNDS.1.ln());
    (lo, hi)
}

/// Unit-variance Matérn-5/2 correlation at scaled distance `r`.
fn matern52_unit(r: f64) -> f64 {
    let s = SQRT_5 * r;
    (1.0 + s + s * s / 3.0) * (-s).exp()
}

fn scaled_sq_dist(a: &[f64], b: &[f64], length_scales: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .zip(length_scales)
        .map(|((x, y), l)| {
            let d = (x - y) / l;
            d * d
        })
        .sum()
}

/// Objective value, gradient and factorisation at one hyperparameter point.
struct Evaluation {
    lml: f64,
    grad: Vec<f64>,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
}

#[allow(clippy::cast_precision_loss)]
fn evaluate(x: &[Vec<f64>], y: &DVector<f64>, hyper: &Hyperparameters, with_grad: bool) -> Option<Evaluation> {
    let n = x.len();
    let dims = hyper.length_scales.len();
    let s2 = hyper.signal_variance;

    let mut r = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..i {
            let d = scaled_sq_dist(&x[i], &x[j], &hyper.length_scales).sqrt();
            r[(i, j)] = d;
            r[(j, i)] = d;
        }
    }
    let corr = r.map(matern52_unit);
    let mut k = &corr * s2;
    for i in 0..n {
        k[(i, i)] += hyper.noise + GP_JITTER;
    }

    let chol = Cholesky::new(k)?;
    let alpha = chol.solve(y);
    let log_det: f64 = chol.l_dirty().diagonal().iter().take(n).map(|v| v.ln()).sum::<f64>() * 2.0;
    let lml = -0.5 * y.dot(&alpha) - 0.5 * log_det - 0.5 * n as f64 * (2.0 * PI).ln();
    if !lml.is_finite() {
        return None;
    }

    let mut grad = Vec::new();
    if with_grad {
        // W = alpha alpha^T - K^-1; d lml / d theta = 0.5 tr(W dK)
        let w = &alpha * alpha.transpose() - chol.inverse();
        let trace = |dk: &DMatrix<f64>| 0.5 * w.component_mul(dk).sum();

        grad.reserve(dims + 2);
        grad.push(trace(&(&corr * s2)));
        for d in 0..dims {
            let l = hyper.length_scales[d];
            let dk = DMatrix::from_fn(n, n, |i, j| {
                let rij = r[(i, j)];
                let diff = (x[i][d] - x[j][d]) / l;
                s2 * (5.0 / 3.0) * (1.0 + SQRT_5 * rij) * (-SQRT_5 * rij).exp() * diff * diff
            });
            grad.push(trace(&dk));
        }
        grad.push(0.5 * hyper.noise * w.diagonal().sum());
    }

    Some(Evaluation {
        lml,
        grad,
        chol,
        alpha,
    })
}

/// Result of one optimizer run.
struct Ascent {
    theta: Vec<f64>,
    lml: f64,
    converged: bool,
}

fn clip(theta: &[f64], lo: &[f64], hi: &[f64]) -> Vec<f64> {
    theta
        .iter()
        .zip(lo.iter().zip(hi))
        .map(|(t, (l, h))| t.clamp(*l, *h))
        .collect()
}

fn projected_grad_norm(theta: &[f64], grad: &[f64], lo: &[f64], hi: &[f64]) -> f64 {
    theta
        .iter()
        .zip(grad)
        .zip(lo.iter().zip(hi))
        .map(|((t, g), (l, h))| {
            if (*t <= *l && *g < 0.0) || (*t >= *h && *g > 0.0) {
                0.0
            } else {
                g.abs()
            }
        })
        .fold(0.0, f64::max)
}

fn ascend(x: &[Vec<f64>], y: &DVector<f64>, start: Vec<f64>, lo: &[f64], hi: &[f64]) -> Option<Ascent> {
    let mut theta = clip(&start, lo, hi);
    let mut current = evaluate(x, y, &Hyperparameters::from_log(&theta), true)?;
    let mut step = 1.0;

    for _ in 0..GP_MAX_ITERATIONS {
        if projected_grad_norm(&theta, &current.grad, lo, hi) < GP_GRADIENT_TOL {
            return Some(Ascent {
                theta,
                lml: current.lml,
                converged: true,
            });
        }

        let mut t = step;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let candidate: Vec<f64> = clip(
                &theta
                    .iter()
                    .zip(&current.grad)
                    .map(|(th, g)| th + t * g)
                    .collect::<Vec<_>>(),
                lo,
                hi,
            );
            let predicted: f64 = candidate
                .iter()
                .zip(&theta)
                .zip(&current.grad)
                .map(|((c, th), g)| g * (c - th))
                .sum();
            if let Some(next) = evaluate(x, y, &Hyperparameters::from_log(&candidate), true) {
                if next.lml >= current.lml + ARMIJO_C * predicted {
                    accepted = Some((candidate, next));
                    break;
                }
            }
            t *= 0.5;
        }

        let Some((candidate, next)) = accepted else {
            // no ascent direction left along the projected gradient
            return Some(Ascent {
                theta,
                lml: current.lml,
                converged: false,
            });
        };
        let gain = next.lml - current.lml;
        let scale = current.lml.abs().max(next.lml.abs()).max(1.0);
        theta = candidate;
        current = next;
        if gain <= OBJECTIVE_TOL * scale {
            return Some(Ascent {
                theta,
                lml: current.lml,
                converged: true,
            });
        }
        step = (t * 2.0).min(1e3);
    }

    Some(Ascent {
        theta,
        lml: current.lml,
        converged: false,
    })
}

fn at_bound(theta: &[f64], lo: &[f64], hi: &[f64]) -> bool {
    let close = |a: f64, b: f64| (a - b).abs() <= 1e-8 + 1e-5 * b.abs();
    theta
        .iter()
        .zip(lo.iter().zip(hi))
        .any(|(t, (l, h))| close(*t, *l) || close(*t, *h))
}

// ============================================================================
// Fitted model
// ============================================================================

#[derive(Debug, Clone)]
pub struct GaussianProcess {
    x_train: Vec<Vec<f64>>,
    hyper: Hyperparameters,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    log_marginal_likelihood: f64,
    outcome: FitOutcome,
}

impl GaussianProcess {
    /// Fit with hyperparameter optimisation, falling back to the stabilized
    /// fixed hyperparameters when the optimisation does not converge cleanly.
    ///
    /// `x` and `y` should already be standardised.
    pub fn fit<R: Rng + ?Sized>(x: &[Vec<f64>], y: &[f64], rng: &mut R) -> CoreResult<Self> {
        let dims = check_training(x, y)?;
        let yv = DVector::from_column_slice(y);
        let (lo, hi) = log_bounds(dims);

        let mut starts = vec![Hyperparameters::isotropic(dims, GP_INITIAL).to_log()];
        for _ in 0..GP_RESTARTS {
            starts.push(lo.iter().zip(&hi).map(|(l, h)| rng.gen_range(*l..=*h)).collect());
        }

        let mut best: Option<Ascent> = None;
        let mut all_converged = true;
        for start in starts {
            match ascend(x, &yv, start, &lo, &hi) {
                Some(run) => {
                    all_converged &= run.converged;
                    if best.as_ref().map_or(true, |b| run.lml > b.lml) {
                        best = Some(run);
                    }
                }
                None => all_converged = false,
            }
        }

        if let Some(run) = best.filter(|r| all_converged && !at_bound(&r.theta, &lo, &hi)) {
            let hyper = Hyperparameters::from_log(&run.theta);
            if let Some(model) = Self::from_hyper(x, &yv, hyper, FitOutcome::Optimized) {
                info!(
                    lml = model.log_marginal_likelihood,
                    signal_variance = model.hyper.signal_variance,
                    noise = model.hyper.noise,
                    "Surrogate fit optimized"
                );
                return Ok(model);
            }
        }

        debug!(all_converged, "Hyperparameter optimisation rejected");
        let model = Self::fit_fixed(x, y, Hyperparameters::isotropic(dims, GP_STABILIZED))?;
        info!(lml = model.log_marginal_likelihood, "Surrogate fit stabilized with fixed hyperparameters");
        Ok(model)
    }

    /// Fit with fixed hyperparameters, no optimisation.
    pub fn fit_fixed(x: &[Vec<f64>], y: &[f64], hyper: Hyperparameters) -> CoreResult<Self> {
        let dims = check_training(x, y)?;
        if hyper.length_scales.len() != dims {
            return Err(CoreError::shape(
                "surrogate length scales",
                format!("{dims} dimensions"),
                format!("{}", hyper.length_scales.len()),
            ));
        }
        let yv = DVector::from_column_slice(y);
        Self::from_hyper(x, &yv, hyper, FitOutcome::Stabilized).ok_or_else(|| CoreError::Instability {
            reason: "surrogate covariance is not positive definite".to_string(),
        })
    }

    fn from_hyper(x: &[Vec<f64>], y: &DVector<f64>, hyper: Hyperparameters, outcome: FitOutcome) -> Option<Self> {
        let eval = evaluate(x, y, &hyper, false)?;
        Some(Self {
            x_train: x.to_vec(),
            hyper,
            chol: eval.chol,
            alpha: eval.alpha,
            log_marginal_likelihood: eval.lml,
            outcome,
        })
    }

    /// Posterior mean and standard deviation at `x` (std includes the
    /// white-noise term).
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let s2 = self.hyper.signal_variance;
        let k_star = DVector::from_iterator(
            self.x_train.len(),
            self.x_train.iter().map(|xt| {
                s2 * matern52_unit(scaled_sq_dist(x, xt, &self.hyper.length_scales).sqrt())
            }),
        );
        let mean = k_star.dot(&self.alpha);
        let v = self.chol.solve(&k_star);
        let var = (s2 + self.hyper.noise - k_star.dot(&v)).max(0.0);
        (mean, var.sqrt())
    }

    pub fn predict_batch(&self, xs: &[Vec<f64>]) -> Vec<(f64, f64)> {
        xs.iter().map(|x| self.predict(x)).collect()
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    pub fn outcome(&self) -> FitOutcome {
        self.outcome
    }

    pub fn n_train(&self) -> usize {
        self.x_train.len()
    }
}

fn check_training(x: &[Vec<f64>], y: &[f64]) -> CoreResult<usize> {
    if x.is_empty() || x.len() != y.len() {
        return Err(CoreError::shape(
            "surrogate training data",
            "equal, non-zero row counts",
            format!("{} feature rows, {} targets", x.len(), y.len()),
        ));
    }
    let dims = x[0].len();
    if dims == 0 || x.iter().any(|r| r.len() != dims) {
        return Err(CoreError::shape(
            "surrogate training data",
            format!("{dims} > 0 columns per row"),
            "ragged or empty rows",
        ));
    }
    Ok(dims)
}
