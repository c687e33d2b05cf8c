//! Candidate search box inferred from the observed parameters.

use tracing::debug;

use crate::config::OptimizerConfig;
use crate::types::{parse_param_column, ParamBase, ParamBounds};

/// Per-column `[low, high]`.
///
/// Explicit per-base overrides win. Otherwise the observed range is widened
/// by `bounds_expansion` on each side, a degenerate range becomes
/// `value +/- min_span`, and amplitude, frequency and pulse width are
/// floored at 0.
pub fn infer_bounds(columns: &[String], x: &[Vec<f64>], config: &OptimizerConfig) -> Vec<ParamBounds> {
    columns
        .iter()
        .enumerate()
        .map(|(j, column)| {
            let base = parse_param_column(column).map_or(ParamBase::Amp, |(b, _)| b);

            if let Some([low, high]) = config.bounds.get(base) {
                return ParamBounds {
                    column: column.clone(),
                    base,
                    low,
                    high,
                };
            }

            let (min, max) = x
                .iter()
                .map(|r| r[j])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let range = max - min;
            let (mut low, high) = if range > 0.0 {
                (min - config.bounds_expansion * range, max + config.bounds_expansion * range)
            } else {
                let span = config.min_span.get(base);
                debug!(column = %column, center = min, span, "Degenerate column range, using minimum span");
                (min - span, min + span)
            };
            if base.is_non_negative() {
                low = low.max(0.0);
            }
            ParamBounds {
                column: column.clone(),
                base,
                low,
                high,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::canonical_columns;

    #[test]
    fn test_expansion_and_floor() {
        let columns = canonical_columns(1);
        let x = vec![vec![0.1, 100.0, 6e-5, 1.0], vec![1.1, 140.0, 6e-5, 2.0]];
        let b = infer_bounds(&columns, &x, &OptimizerConfig::default());
        // amp: 0.1 - 0.1 * 1.0 = 0.0, 1.1 + 0.1 = 1.2
        assert!(b[0].low.abs() < 1e-12);
        assert!((b[0].high - 1.2).abs() < 1e-12);
        assert!((b[1].low - 96.0).abs() < 1e-9);
        // constant pulse width: 6e-5 +/- 0.5, floored at 0
        assert_eq!(b[2].low, 0.0);
        assert!((b[2].high - (6e-5 + 0.5)).abs() < 1e-12);
        // phase may go negative
        assert!((b[3].low - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_override_wins() {
        let mut config = OptimizerConfig::default();
        config.bounds.freq_hz = Some([20.0, 200.0]);
        let columns = canonical_columns(2);
        let x = vec![vec![1.0; 8], vec![2.0; 8]];
        let b = infer_bounds(&columns, &x, &config);
        assert_eq!((b[1].low, b[1].high), (20.0, 200.0));
        assert_eq!((b[5].low, b[5].high), (20.0, 200.0));
        assert_eq!(b[5].base, ParamBase::FreqHz);
    }
}
