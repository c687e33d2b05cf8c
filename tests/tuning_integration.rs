//! Closed-loop tuning against the simulated patient, persisting the history
//! after every iteration the way the `tune-loop` binary does.

use stimtune::config::TunerConfig;
use stimtune::history::{read_history, write_history};
use stimtune::severity::SeverityEvaluator;
use stimtune::tuning::{run_tuning_with, seed_history};
use stimtune::types::HistoryTable;

#[test]
fn tuning_loop_persists_every_iteration() {
    let mut config = TunerConfig::default();
    config.severity.rollout_duration_s = 2.0;
    config.optimizer.n_candidates = 400;
    config.tuning.iterations = 3;
    config.tuning.batch_size = 2;

    let evaluator = SeverityEvaluator::new(&config, None).expect("evaluator");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("patient.csv");

    let mut history = HistoryTable::new(Vec::new());
    seed_history(&mut history, &evaluator, 3, 2, config.seed).expect("seed");
    write_history(&history, &path).expect("write");
    let seeded = history.len();

    let mut saved_rows = Vec::new();
    let report = run_tuning_with(&mut history, &evaluator, &config, |_, table| {
        write_history(table, &path)?;
        saved_rows.push(table.len());
        Ok(())
    })
    .expect("tuning");

    assert_eq!(report.iterations, 3);
    assert_eq!(saved_rows.len(), 3);
    assert!(saved_rows.windows(2).all(|w| w[0] <= w[1]));

    let on_disk = read_history(&path).expect("read");
    assert_eq!(on_disk.len(), history.len());
    assert_eq!(on_disk.len(), seeded + report.evaluations.len());
    assert_eq!(on_disk.n_channels(), 2);

    let best = report.best.expect("best row");
    let min_loss = on_disk
        .records
        .iter()
        .filter_map(|r| r.severity)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(best.severity, Some(min_loss));
}
