//! Stimulation parameter types

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Number of parameter rows per channel (amplitude, frequency, pulse width, phase).
pub const PARAMS_PER_CHANNEL: usize = 4;

/// One of the four per-channel stimulation parameters.
///
/// The declaration order is the canonical column order used everywhere a
/// parameter vector is flattened: `amp_i, freq_hz_i, pulse_width_s_i, phase_rad_i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamBase {
    /// Pulse amplitude (arbitrary drive units, >= 0)
    Amp,
    /// Pulse repetition frequency (Hz, > 0)
    FreqHz,
    /// Pulse width (seconds, within one period)
    PulseWidthS,
    /// Phase offset (radians)
    PhaseRad,
}

impl ParamBase {
    pub const ALL: [ParamBase; PARAMS_PER_CHANNEL] = [
        ParamBase::Amp,
        ParamBase::FreqHz,
        ParamBase::PulseWidthS,
        ParamBase::PhaseRad,
    ];

    /// Column prefix used in persisted history tables.
    pub fn prefix(self) -> &'static str {
        match self {
            ParamBase::Amp => "amp",
            ParamBase::FreqHz => "freq_hz",
            ParamBase::PulseWidthS => "pulse_width_s",
            ParamBase::PhaseRad => "phase_rad",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.prefix() == prefix)
    }

    /// Position of this base inside one channel block.
    pub fn offset(self) -> usize {
        match self {
            ParamBase::Amp => 0,
            ParamBase::FreqHz => 1,
            ParamBase::PulseWidthS => 2,
            ParamBase::PhaseRad => 3,
        }
    }

    /// Column name for channel `index`, e.g. `freq_hz_2`.
    pub fn column(self, index: usize) -> String {
        format!("{}_{}", self.prefix(), index)
    }

    /// Range the device is documented to accept. Stability guarantees of the
    /// simulator hold inside these ranges.
    pub fn documented_range(self) -> (f64, f64) {
        match self {
            ParamBase::Amp => (0.0, 5.0),
            ParamBase::FreqHz => (20.0, 200.0),
            ParamBase::PulseWidthS => (1e-5, 2e-4),
            ParamBase::PhaseRad => (0.0, std::f64::consts::TAU),
        }
    }

    /// Amplitude, frequency and pulse width are physically non-negative.
    pub fn is_non_negative(self) -> bool {
        !matches!(self, ParamBase::PhaseRad)
    }
}

impl std::fmt::Display for ParamBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Split a column name like `pulse_width_s_3` into its base and channel index.
pub fn parse_param_column(name: &str) -> Option<(ParamBase, usize)> {
    let (prefix, index) = name.trim().rsplit_once('_')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let base = ParamBase::from_prefix(prefix)?;
    index.parse().ok().map(|i| (base, i))
}

/// Parse a `4 x N` matrix written as `"a0,a1;f0,f1;w0,w1;p0,p1"`.
///
/// Only the text is checked here; [`StimParams::from_matrix`] checks the shape.
pub fn parse_param_matrix(text: &str) -> CoreResult<Vec<Vec<f64>>> {
    text.split(';')
        .enumerate()
        .map(|(i, row)| {
            row.split(',')
                .map(|cell| {
                    let cell = cell.trim();
                    cell.parse::<f64>().map_err(|_| {
                        CoreError::shape("stim param matrix", "numeric cells", format!("row {i}: '{cell}'"))
                    })
                })
                .collect()
        })
        .collect()
}

/// Canonical flattened column list for `n_channels` channels.
pub fn canonical_columns(n_channels: usize) -> Vec<String> {
    (0..n_channels)
        .flat_map(|i| ParamBase::ALL.into_iter().map(move |b| b.column(i)))
        .collect()
}

/// Per-channel stimulation parameters.
///
/// All four sequences share the same length N >= 1. Fields are private so
/// the invariants checked in [`StimParams::new`] hold for the lifetime of
/// the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimParams {
    amp: Vec<f64>,
    freq_hz: Vec<f64>,
    pulse_width_s: Vec<f64>,
    phase_rad: Vec<f64>,
}

impl StimParams {
    /// Build and validate a parameter set.
    ///
    /// Fails with `InvalidInputShape` when the sequences differ in length,
    /// are empty, or hold values outside the physical domain
    /// (negative amplitude, non-positive frequency, pulse width outside
    /// `[0, 1/freq]`, non-finite entries).
    pub fn new(
        amp: Vec<f64>,
        freq_hz: Vec<f64>,
        pulse_width_s: Vec<f64>,
        phase_rad: Vec<f64>,
    ) -> CoreResult<Self> {
        let n = amp.len();
        if n == 0 {
            return Err(CoreError::shape("stim params", "N >= 1 channels", "0 channels"));
        }
        if freq_hz.len() != n || pulse_width_s.len() != n || phase_rad.len() != n {
            return Err(CoreError::shape(
                "stim params",
                format!("4 sequences of length {n}"),
                format!(
                    "lengths amp={} freq_hz={} pulse_width_s={} phase_rad={}",
                    n,
                    freq_hz.len(),
                    pulse_width_s.len(),
                    phase_rad.len()
                ),
            ));
        }

        for i in 0..n {
            let (a, f, w, p) = (amp[i], freq_hz[i], pulse_width_s[i], phase_rad[i]);
            if !(a.is_finite() && f.is_finite() && w.is_finite() && p.is_finite()) {
                return Err(CoreError::shape(
                    "stim params",
                    "finite values",
                    format!("non-finite entry on channel {i}"),
                ));
            }
            if a < 0.0 {
                return Err(CoreError::shape(
                    "stim params",
                    "amp >= 0",
                    format!("amp_{i} = {a}"),
                ));
            }
            if f <= 0.0 {
                return Err(CoreError::shape(
                    "stim params",
                    "freq_hz > 0",
                    format!("freq_hz_{i} = {f}"),
                ));
            }
            if w < 0.0 || w > 1.0 / f {
                return Err(CoreError::shape(
                    "stim params",
                    format!("pulse_width_s in [0, {:.3e}]", 1.0 / f),
                    format!("pulse_width_s_{i} = {w}"),
                ));
            }
        }

        Ok(Self {
            amp,
            freq_hz,
            pulse_width_s,
            phase_rad,
        })
    }

    /// Build from a 4 x N row-major matrix (rows: amp, freq, pulse width, phase).
    pub fn from_matrix(rows: &[Vec<f64>]) -> CoreResult<Self> {
        if rows.len() != PARAMS_PER_CHANNEL {
            return Err(CoreError::shape(
                "stim param matrix",
                "4 x N",
                format!("{} rows", rows.len()),
            ));
        }
        let n = rows[0].len();
        if rows.iter().any(|r| r.len() != n) {
            let widths: Vec<String> = rows.iter().map(|r| r.len().to_string()).collect();
            return Err(CoreError::shape(
                "stim param matrix",
                format!("4 x {n}"),
                format!("row widths [{}]", widths.join(", ")),
            ));
        }
        Self::new(rows[0].clone(), rows[1].clone(), rows[2].clone(), rows[3].clone())
    }

    /// Build from a flattened canonical vector `[amp_0, freq_0, pw_0, phase_0, amp_1, ...]`.
    ///
    /// Pulse width is clipped into `[0, 1/freq]` and amplitude/frequency are
    /// floored at their physical minimum, because optimizer candidates are
    /// drawn from boxes that ignore the coupling between width and period.
    pub fn from_flat(values: &[f64]) -> CoreResult<Self> {
        if values.is_empty() || values.len() % PARAMS_PER_CHANNEL != 0 {
            return Err(CoreError::shape(
                "flattened stim params",
                "non-empty multiple of 4",
                format!("{} values", values.len()),
            ));
        }
        let n = values.len() / PARAMS_PER_CHANNEL;
        let mut amp = Vec::with_capacity(n);
        let mut freq = Vec::with_capacity(n);
        let mut pw = Vec::with_capacity(n);
        let mut phase = Vec::with_capacity(n);
        for block in values.chunks_exact(PARAMS_PER_CHANNEL) {
            let f = block[1].max(MIN_FREQ_HZ);
            amp.push(block[0].max(0.0));
            freq.push(f);
            pw.push(block[2].clamp(0.0, 1.0 / f));
            phase.push(block[3]);
        }
        Self::new(amp, freq, pw, phase)
    }

    /// All-zero amplitude copy with the same channel layout (stimulation off).
    pub fn zero_amplitude(&self) -> Self {
        Self {
            amp: vec![0.0; self.n_channels()],
            ..self.clone()
        }
    }

    pub fn n_channels(&self) -> usize {
        self.amp.len()
    }

    pub fn amp(&self) -> &[f64] {
        &self.amp
    }

    pub fn freq_hz(&self) -> &[f64] {
        &self.freq_hz
    }

    pub fn pulse_width_s(&self) -> &[f64] {
        &self.pulse_width_s
    }

    pub fn phase_rad(&self) -> &[f64] {
        &self.phase_rad
    }

    /// 4 x N matrix view (rows: amp, freq, pulse width, phase).
    pub fn as_matrix(&self) -> Vec<Vec<f64>> {
        vec![
            self.amp.clone(),
            self.freq_hz.clone(),
            self.pulse_width_s.clone(),
            self.phase_rad.clone(),
        ]
    }

    /// Flattened canonical vector, matching [`canonical_columns`].
    pub fn to_flat(&self) -> Vec<f64> {
        (0..self.n_channels())
            .flat_map(|i| {
                [
                    self.amp[i],
                    self.freq_hz[i],
                    self.pulse_width_s[i],
                    self.phase_rad[i],
                ]
            })
            .collect()
    }
}

/// Frequency floor applied when decoding optimizer candidates.
const MIN_FREQ_HZ: f64 = 1e-3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_matrix() {
        let rows = parse_param_matrix("1.5,0.5; 130,90;6e-5,6e-5;0,1").unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], vec![130.0, 90.0]);
        assert!(StimParams::from_matrix(&rows).is_ok());
        assert!(matches!(
            parse_param_matrix("1;x;6e-5;0"),
            Err(CoreError::InvalidInputShape { .. })
        ));
    }

    fn two_channel() -> StimParams {
        StimParams::from_matrix(&[
            vec![1.0, 1.0],
            vec![120.0, 80.0],
            vec![60e-6, 60e-6],
            vec![0.0, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_from_matrix_roundtrips_layout() {
        let p = two_channel();
        assert_eq!(p.n_channels(), 2);
        assert_eq!(p.to_flat(), vec![1.0, 120.0, 60e-6, 0.0, 1.0, 80.0, 60e-6, 1.0]);
        assert_eq!(p.as_matrix()[1], vec![120.0, 80.0]);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = StimParams::new(vec![1.0, 1.0], vec![100.0], vec![6e-5], vec![0.0]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInputShape { .. }));
    }

    #[test]
    fn test_matrix_must_have_four_rows() {
        let err = StimParams::from_matrix(&[vec![1.0], vec![100.0], vec![6e-5]]).unwrap_err();
        assert!(err.to_string().contains("3 rows"));
    }

    #[test]
    fn test_domain_checks() {
        assert!(StimParams::new(vec![-0.1], vec![100.0], vec![6e-5], vec![0.0]).is_err());
        assert!(StimParams::new(vec![1.0], vec![0.0], vec![6e-5], vec![0.0]).is_err());
        // width longer than the 10 ms period
        assert!(StimParams::new(vec![1.0], vec![100.0], vec![0.02], vec![0.0]).is_err());
        assert!(StimParams::new(vec![1.0], vec![100.0], vec![0.01], vec![0.0]).is_ok());
    }

    #[test]
    fn test_from_flat_clips_width_into_period() {
        let p = StimParams::from_flat(&[-1.0, 50.0, 0.5, 0.3]).unwrap();
        assert_eq!(p.amp()[0], 0.0);
        assert!((p.pulse_width_s()[0] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_parse_param_column() {
        assert_eq!(parse_param_column("pulse_width_s_3"), Some((ParamBase::PulseWidthS, 3)));
        assert_eq!(parse_param_column("amp_0"), Some((ParamBase::Amp, 0)));
        assert_eq!(parse_param_column("freq_0x"), None);
        assert_eq!(parse_param_column("severity"), None);
        assert_eq!(parse_param_column("width_1"), None);
    }

    #[test]
    fn test_canonical_columns_order() {
        let cols = canonical_columns(2);
        assert_eq!(
            cols,
            vec![
                "amp_0", "freq_hz_0", "pulse_width_s_0", "phase_rad_0",
                "amp_1", "freq_hz_1", "pulse_width_s_1", "phase_rad_1",
            ]
        );
    }
}
