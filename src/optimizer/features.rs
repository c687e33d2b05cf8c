//! Feature matrix construction from observation rows.

use std::collections::HashMap;

use crate::types::{canonical_columns, ObservationRecord, PARAMS_PER_CHANNEL};

/// Deduplicated, imputed training data in canonical column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.x.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }
}

/// Width of the widest row, rounded up to whole channels.
pub fn feature_width(records: &[ObservationRecord]) -> usize {
    records
        .iter()
        .map(ObservationRecord::n_channels)
        .max()
        .unwrap_or(0)
        * PARAMS_PER_CHANNEL
}

/// Row padded with `NaN` up to `width`.
pub fn padded(params: &[f64], width: usize) -> Vec<f64> {
    let mut row = params.to_vec();
    row.resize(width, f64::NAN);
    row
}

/// Bit pattern with every `NaN` collapsed to one key, so missing cells
/// compare equal when grouping.
fn row_key(row: &[f64]) -> Vec<u64> {
    row.iter()
        .map(|v| if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() })
        .collect()
}

/// Collapse identical parameter rows into one, averaging their severities.
///
/// Only scored rows take part. Groups keep first-occurrence order.
#[allow(clippy::cast_precision_loss)]
pub fn dedup_mean(records: &[ObservationRecord], width: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut index: HashMap<Vec<u64>, usize> = HashMap::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut sums: Vec<(f64, usize)> = Vec::new();

    for record in records {
        let Some(severity) = record.severity.filter(|s| s.is_finite()) else {
            continue;
        };
        let row = padded(&record.params, width);
        let key = row_key(&row);
        match index.get(&key) {
            Some(&i) => {
                sums[i].0 += severity;
                sums[i].1 += 1;
            }
            None => {
                index.insert(key, rows.len());
                rows.push(row);
                sums.push((severity, 1));
            }
        }
    }
    let y = sums.into_iter().map(|(s, n)| s / n as f64).collect();
    (rows, y)
}

/// Replace `NaN` cells by their column mean; all-missing columns become 0.
#[allow(clippy::cast_precision_loss)]
pub fn impute_column_means(x: &mut [Vec<f64>]) {
    let width = x.first().map_or(0, Vec::len);
    for j in 0..width {
        let (sum, count) = x
            .iter()
            .map(|row| row[j])
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        let fill = if count == 0 { 0.0 } else { sum / count as f64 };
        for row in x.iter_mut() {
            if row[j].is_nan() {
                row[j] = fill;
            }
        }
    }
}

/// Canonical columns, deduplicated scored rows and imputed features.
pub fn build_features(records: &[ObservationRecord]) -> FeatureMatrix {
    let width = feature_width(records);
    let (mut x, y) = dedup_mean(records, width);
    impute_column_means(&mut x);
    FeatureMatrix {
        columns: canonical_columns(width / PARAMS_PER_CHANNEL),
        x,
        y,
    }
}
