//! Observation history: (parameters, severity) rows fed to the optimizer.

use serde::{Deserialize, Serialize};

use super::stim::{canonical_columns, StimParams, PARAMS_PER_CHANNEL};

/// One historical trial.
///
/// `params` is the flattened canonical vector (`amp_0, freq_hz_0,
/// pulse_width_s_0, phase_rad_0, amp_1, ...`). Missing cells are `NaN` and
/// get imputed before fitting. `severity` is `None` for trials that were
/// applied but never scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub params: Vec<f64>,
    pub severity: Option<f64>,
}

impl ObservationRecord {
    pub fn new(params: Vec<f64>, severity: f64) -> Self {
        Self {
            params,
            severity: Some(severity),
        }
    }

    pub fn unscored(params: Vec<f64>) -> Self {
        Self {
            params,
            severity: None,
        }
    }

    pub fn from_stim(stim: &StimParams, severity: f64) -> Self {
        Self::new(stim.to_flat(), severity)
    }

    /// Channels spanned by this row (partial trailing blocks count).
    pub fn n_channels(&self) -> usize {
        self.params.len().div_ceil(PARAMS_PER_CHANNEL)
    }
}

/// Ordered, append-only history plus the column layout it was read with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryTable {
    pub records: Vec<ObservationRecord>,
    /// Whether the source table carried a severity column at all
    pub has_severity_column: bool,
}

impl HistoryTable {
    pub fn new(records: Vec<ObservationRecord>) -> Self {
        Self {
            records,
            has_severity_column: true,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: ObservationRecord) {
        self.records.push(record);
    }

    /// Widest channel count over all rows.
    pub fn n_channels(&self) -> usize {
        self.records
            .iter()
            .map(ObservationRecord::n_channels)
            .max()
            .unwrap_or(0)
    }

    /// Canonical column names for [`Self::n_channels`].
    pub fn columns(&self) -> Vec<String> {
        canonical_columns(self.n_channels())
    }

    /// Only the most recent `n` rows.
    pub fn tail(&self, n: usize) -> &[ObservationRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Lowest-severity scored row.
    pub fn best(&self) -> Option<&ObservationRecord> {
        self.records
            .iter()
            .filter_map(|r| r.severity.filter(|s| s.is_finite()).map(|s| (r, s)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(r, _)| r)
    }
}
