//! Closed-loop tuning driver.
//!
//! Each iteration asks the optimizer for a batch, scores the batch with the
//! severity evaluator and appends the scored rows to the history, so the
//! next suggestion sees every result so far.
//!
//! ```text
//! history ──► suggest ──► batch ──► evaluate (rayon) ──► push rows ──┐
//!    ▲                                                               │
//!    └───────────────────────────────────────────────────────────────┘
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TunerConfig;
use crate::error::{CoreError, CoreResult};
use crate::optimizer::suggest_table;
use crate::severity::{sweep::sample_params, SeverityEvaluator};
use crate::types::{HistoryTable, ObservationRecord, StimParams};

/// One scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub iteration: usize,
    /// 1-based position inside the iteration's batch
    pub candidate: usize,
    pub severity: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TuningReport {
    /// Scored candidates in evaluation order
    pub evaluations: Vec<Evaluation>,
    pub iterations: usize,
    /// Candidates rejected as unstable
    pub rejected: usize,
    /// Lowest-severity row in the history after the run
    pub best: Option<ObservationRecord>,
}

impl TuningReport {
    pub fn losses(&self) -> Vec<f64> {
        self.evaluations.iter().map(|e| e.severity).collect()
    }
}

/// Run `config.tuning.iterations` suggest/evaluate rounds.
pub fn run_tuning(
    history: &mut HistoryTable,
    evaluator: &SeverityEvaluator,
    config: &TunerConfig,
) -> CoreResult<TuningReport> {
    run_tuning_with(history, evaluator, config, |_, _| Ok(()))
}

/// [`run_tuning`] with a hook called after every iteration with the grown
/// history, e.g. to persist it.
pub fn run_tuning_with<F>(
    history: &mut HistoryTable,
    evaluator: &SeverityEvaluator,
    config: &TunerConfig,
    mut on_iteration: F,
) -> CoreResult<TuningReport>
where
    F: FnMut(usize, &HistoryTable) -> CoreResult<()>,
{
    let mut optimizer = config.optimizer.clone();
    optimizer.batch_size = config.tuning.batch_size.max(1);
    let iterations = config.tuning.iterations;
    let mut report = TuningReport::default();

    for iteration in 1..=iterations {
        // 1. Suggest
        let suggestion = suggest_table(history, &optimizer)?;
        let candidates: Vec<StimParams> = suggestion
            .next_params_batch
            .iter()
            .filter_map(|row| match StimParams::from_flat(row) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(iteration, error = %e, "Suggested row is not a valid parameter set");
                    None
                }
            })
            .collect();

        // 2. Evaluate
        let results: Vec<CoreResult<f64>> = if config.tuning.parallel {
            candidates.par_iter().map(|p| evaluator.evaluate(p, None)).collect()
        } else {
            candidates.iter().map(|p| evaluator.evaluate(p, None)).collect()
        };

        // 3. Record
        let batch = candidates.len();
        for (j, (params, result)) in candidates.iter().zip(results).enumerate() {
            match result {
                Ok(severity) => {
                    info!(
                        iteration,
                        iterations,
                        candidate = j + 1,
                        batch,
                        severity,
                        rows = history.len() + 1,
                        "Evaluated candidate"
                    );
                    history.push(ObservationRecord::from_stim(params, severity));
                    history.has_severity_column = true;
                    report.evaluations.push(Evaluation {
                        iteration,
                        candidate: j + 1,
                        severity,
                    });
                }
                Err(CoreError::Instability { reason }) => {
                    warn!(iteration, candidate = j + 1, reason = %reason, "Rejected unstable candidate");
                    report.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        report.iterations = iteration;
        on_iteration(iteration, history)?;
    }

    report.best = history.best().cloned();
    info!(
        iterations = report.iterations,
        evaluated = report.evaluations.len(),
        rejected = report.rejected,
        best = report.best.as_ref().and_then(|r| r.severity),
        "Tuning finished"
    );
    Ok(report)
}

/// Score `n` random parameter sets drawn within documented bounds and append
/// them, giving an empty history something to start from.
pub fn seed_history(
    history: &mut HistoryTable,
    evaluator: &SeverityEvaluator,
    n: usize,
    n_channels: usize,
    seed: u64,
) -> CoreResult<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..n {
        let params = sample_params(&mut rng, n_channels)?;
        match evaluator.evaluate(&params, None) {
            Ok(severity) => {
                info!(sample = i + 1, total = n, severity, "Seeded history row");
                history.push(ObservationRecord::from_stim(&params, severity));
            }
            Err(CoreError::Instability { reason }) => {
                warn!(sample = i + 1, reason = %reason, "Skipping unstable seed sample");
            }
            Err(e) => return Err(e),
        }
    }
    history.has_severity_column = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(iterations: usize, batch: usize, parallel: bool) -> TunerConfig {
        let mut config = TunerConfig::default();
        config.severity.rollout_duration_s = 2.0;
        config.optimizer.n_candidates = 300;
        config.tuning.iterations = iterations;
        config.tuning.batch_size = batch;
        config.tuning.parallel = parallel;
        config
    }

    fn seeded(evaluator: &SeverityEvaluator) -> HistoryTable {
        let mut history = HistoryTable::new(Vec::new());
        seed_history(&mut history, evaluator, 4, 1, 11).unwrap();
        history
    }

    #[test]
    fn test_tuning_grows_history() {
        let config = fast_config(2, 2, true);
        let evaluator = SeverityEvaluator::new(&config, None).unwrap();
        let mut history = seeded(&evaluator);
        let start = history.len();

        let mut calls = Vec::new();
        let report = run_tuning_with(&mut history, &evaluator, &config, |i, h| {
            calls.push((i, h.len()));
            Ok(())
        })
        .unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(history.len(), start + report.evaluations.len());
        assert_eq!(report.evaluations.len() + report.rejected, 4);
        assert_eq!(calls.len(), 2);
        assert!(report.losses().iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(report.best.is_some());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let par = fast_config(1, 3, true);
        let seq = fast_config(1, 3, false);
        let evaluator = SeverityEvaluator::new(&par, None).unwrap();

        let mut a = seeded(&evaluator);
        let mut b = a.clone();
        let ra = run_tuning(&mut a, &evaluator, &par).unwrap();
        let rb = run_tuning(&mut b, &evaluator, &seq).unwrap();
        assert_eq!(ra.losses(), rb.losses());
    }

    #[test]
    fn test_empty_history_is_error() {
        let config = fast_config(1, 1, false);
        let evaluator = SeverityEvaluator::new(&config, None).unwrap();
        let mut history = HistoryTable::default();
        assert!(matches!(
            run_tuning(&mut history, &evaluator, &config),
            Err(CoreError::EmptyHistory)
        ));
    }
}
