//! Monte Carlo exploration of the severity response range.
//!
//! Random parameter matrices are drawn uniformly inside the documented
//! per-parameter bounds, scored, and summarised with order statistics and an
//! ASCII histogram.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{info, warn};

use super::SeverityEvaluator;
use crate::error::CoreResult;
use crate::types::{ParamBase, StimParams};

/// Uniform draw inside [`ParamBase::documented_range`] for each channel.
///
/// Draws are base-major (all amplitudes, then all frequencies, ...).
pub fn sample_params<R: Rng + ?Sized>(rng: &mut R, n_channels: usize) -> CoreResult<StimParams> {
    let rows: Vec<Vec<f64>> = ParamBase::ALL
        .iter()
        .map(|base| {
            let (lo, hi) = base.documented_range();
            (0..n_channels).map(|_| rng.gen_range(lo..hi)).collect()
        })
        .collect();
    StimParams::from_matrix(&rows)
}

/// Linear-interpolated percentile of sorted `values`, `p` in [0, 100].
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub median: f64,
    pub p5: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
}

impl SummaryStats {
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            std: var.sqrt(),
            median: percentile(&sorted, 50.0),
            p5: percentile(&sorted, 5.0),
            p25: percentile(&sorted, 25.0),
            p75: percentile(&sorted, 75.0),
            p95: percentile(&sorted, 95.0),
        })
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Equal-width bin counts and the `bins + 1` edges. The last bin is closed.
/// A constant sample is spread over `[v - 0.5, v + 0.5]`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn histogram(values: &[f64], bins: usize) -> (Vec<usize>, Vec<f64>) {
    let bins = bins.max(1);
    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(l, h), &v| (l.min(v), h.max(v)));
    if values.is_empty() {
        lo = 0.0;
        hi = 1.0;
    } else if lo >= hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
    let mut counts = vec![0; bins];
    for &v in values {
        let idx = (((v - lo) / width).floor().max(0.0) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    (counts, edges)
}

/// One line per bin: `[lo, hi)  ####  count`, bars scaled to `width`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn ascii_histogram(values: &[f64], bins: usize, width: usize) -> String {
    let (counts, edges) = histogram(values, bins);
    let max_count = counts.iter().copied().max().unwrap_or(0);
    let mut out = String::new();
    for (i, &c) in counts.iter().enumerate() {
        let bar_len = if max_count > 0 {
            (width as f64 * c as f64 / max_count as f64) as usize
        } else {
            0
        };
        let bar = "#".repeat(bar_len);
        let _ = writeln!(
            out,
            "  [{:+.4}, {:+.4})  {bar:<width$}  {c}",
            edges[i],
            edges[i + 1]
        );
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    pub samples: usize,
    pub channels: usize,
    pub seed: u64,
    /// Score every draw on a different patient
    pub vary_patient: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub values: Vec<f64>,
    /// `(sample index, error message)` for draws that failed
    pub failures: Vec<(usize, String)>,
}

impl SweepReport {
    pub fn summary(&self) -> Option<SummaryStats> {
        SummaryStats::from_values(&self.values)
    }
}

/// Draw and score `settings.samples` random parameter sets.
///
/// With `vary_patient`, draw `i` is scored with seed `seed * 1000 + i`.
pub fn run_sweep(evaluator: &SeverityEvaluator, settings: SweepSettings) -> CoreResult<SweepReport> {
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut report = SweepReport::default();
    info!(
        samples = settings.samples,
        channels = settings.channels,
        vary_patient = settings.vary_patient,
        "Starting severity sweep"
    );
    for i in 0..settings.samples {
        let params = sample_params(&mut rng, settings.channels)?;
        let result = if settings.vary_patient {
            let patient_seed = settings.seed.wrapping_mul(1000).wrapping_add(i as u64) % (1 << 31);
            evaluator.evaluate_with_seed(&params, patient_seed, None)
        } else {
            evaluator.evaluate(&params, None)
        };
        match result {
            Ok(v) => {
                info!(sample = i + 1, total = settings.samples, severity = v, "Sweep sample");
                report.values.push(v);
            }
            Err(e) => {
                warn!(sample = i + 1, error = %e, "Sweep sample failed");
                report.failures.push((i, e.to_string()));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_params_within_documented_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let p = sample_params(&mut rng, 4).unwrap();
            assert_eq!(p.n_channels(), 4);
            assert!(p.amp().iter().all(|a| (0.0..5.0).contains(a)));
            assert!(p.freq_hz().iter().all(|f| (20.0..200.0).contains(f)));
            assert!(p.pulse_width_s().iter().all(|w| (1e-5..2e-4).contains(w)));
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 4.0);
        assert!((percentile(&sorted, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&sorted, 25.0) - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_summary_stats() {
        let s = SummaryStats::from_values(&[3.0, -1.0, 1.0]).unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.min, -1.0);
        assert_eq!(s.max, 3.0);
        assert_eq!(s.range(), 4.0);
        assert!((s.mean - 1.0).abs() < 1e-12);
        assert_eq!(s.median, 1.0);
        assert!(SummaryStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_histogram_counts_everything() {
        let values = [0.0, 0.1, 0.5, 0.9, 1.0];
        let (counts, edges) = histogram(&values, 4);
        assert_eq!(counts.iter().sum::<usize>(), 5);
        assert_eq!(edges.len(), 5);
        assert_eq!(counts[3], 2); // max lands in the closed last bin

        let (flat, edges) = histogram(&[2.0, 2.0], 2);
        assert_eq!(flat.iter().sum::<usize>(), 2);
        assert_eq!(edges[0], 1.5);
    }

    #[test]
    fn test_ascii_histogram_scales_bars() {
        let text = ascii_histogram(&[0.0, 0.0, 1.0], 2, 10);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(&"#".repeat(10)));
        assert!(lines[1].contains(&"#".repeat(5)));
        assert!(!lines[1].contains(&"#".repeat(6)));
    }
}
