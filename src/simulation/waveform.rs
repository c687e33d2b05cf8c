//! Waveform encoder: per-channel stimulation parameters to drive signals.

use std::f64::consts::TAU;

use crate::config::{EncoderConfig, Reduction, WaveformKind};
use crate::types::StimParams;

/// Encoded stimulation, channel-major.
///
/// After a `sum` or `mean` reduction there is exactly one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulation {
    pub channels: Vec<Vec<f64>>,
}

impl Stimulation {
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// First channel, or an empty slice when there are none.
    pub fn primary(&self) -> &[f64] {
        self.channels.first().map_or(&[], Vec::as_slice)
    }

    /// Per-sample mean across channels.
    #[allow(clippy::cast_precision_loss)]
    pub fn channel_mean(&self) -> Vec<f64> {
        let Some(first) = self.channels.first() else {
            return Vec::new();
        };
        let n = self.channels.len() as f64;
        (0..first.len())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f64>() / n)
            .collect()
    }
}

// ============================================================================
// Single-channel waveforms
// ============================================================================

pub fn sinusoid(t: &[f64], amp: f64, freq_hz: f64, phase: f64) -> Vec<f64> {
    t.iter().map(|&ti| amp * (TAU * freq_hz * ti + phase).sin()).collect()
}

/// Half-wave rectified sine.
pub fn rectified_sinusoid(t: &[f64], amp: f64, freq_hz: f64, phase: f64) -> Vec<f64> {
    t.iter()
        .map(|&ti| amp * (TAU * freq_hz * ti + phase).sin().max(0.0))
        .collect()
}

/// Periodic square pulse train with area-preserving sampling.
///
/// Each output sample is `amp` times the fraction of `[t - dt/2, t + dt/2]`
/// during which the pulse is on, so a 60 us pulse sampled at 1 ms still
/// delivers its full charge instead of aliasing to zero. `dt` is the mean
/// grid spacing. The phase shifts the train by `phase / (2 pi f)` seconds.
///
/// Edge cases: `freq_hz <= 0` or `pulse_width_s <= 0` give zeros, a width of
/// at least one period gives a constant `amp`. A single-point grid is point
/// sampled.
#[allow(clippy::cast_precision_loss)]
pub fn square_pulse_train(
    t: &[f64],
    amp: f64,
    freq_hz: f64,
    pulse_width_s: f64,
    phase: f64,
) -> Vec<f64> {
    if freq_hz <= 0.0 || t.is_empty() {
        return vec![0.0; t.len()];
    }
    let period = 1.0 / freq_hz;
    let tau = phase / (TAU * freq_hz);

    if t.len() == 1 {
        let shifted = (t[0] + tau).rem_euclid(period);
        return vec![if shifted < pulse_width_s { amp } else { 0.0 }];
    }

    let width = pulse_width_s.clamp(0.0, period);
    if width <= 0.0 {
        return vec![0.0; t.len()];
    }
    if width >= period {
        return vec![amp; t.len()];
    }

    let dt = (t[t.len() - 1] - t[0]) / (t.len() - 1) as f64;

    // Shift the whole window by whole periods so every interval start is positive.
    let min_a = t.iter().fold(f64::INFINITY, |m, &ti| m.min(ti + tau - 0.5 * dt));
    let shift = if min_a < 0.0 {
        ((-min_a) / period).ceil().mul_add(period, period)
    } else {
        0.0
    };

    t.iter()
        .map(|&ti| {
            let a = ti + tau - 0.5 * dt + shift;
            let b = a + dt;
            let on = periodic_on_time(b, period, width) - periodic_on_time(a, period, width);
            amp * (on / dt).clamp(0.0, 1.0)
        })
        .collect()
}

/// Total on-time of the pulse train over `[0, x]`, `x >= 0`.
fn periodic_on_time(x: f64, period: f64, width: f64) -> f64 {
    let k = (x / period).floor();
    let r = x - k * period;
    k * width + r.min(width)
}

// ============================================================================
// Encoder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformEncoder {
    pub kind: WaveformKind,
    pub reduction: Reduction,
}

impl Default for WaveformEncoder {
    fn default() -> Self {
        Self::from_config(&EncoderConfig::default())
    }
}

impl WaveformEncoder {
    pub fn from_config(config: &EncoderConfig) -> Self {
        Self {
            kind: config.waveform,
            reduction: config.reduction,
        }
    }

    /// Encode every channel on the grid `t`, then apply the reduction.
    #[allow(clippy::cast_precision_loss)]
    pub fn encode(&self, t: &[f64], params: &StimParams) -> Stimulation {
        let channels: Vec<Vec<f64>> = (0..params.n_channels())
            .map(|i| {
                let (a, f, w, p) = (
                    params.amp()[i],
                    params.freq_hz()[i],
                    params.pulse_width_s()[i],
                    params.phase_rad()[i],
                );
                match self.kind {
                    WaveformKind::SquarePulse => square_pulse_train(t, a, f, w, p),
                    WaveformKind::Sinusoid => sinusoid(t, a, f, p),
                    WaveformKind::RectifiedSinusoid => rectified_sinusoid(t, a, f, p),
                }
            })
            .collect();

        match self.reduction {
            Reduction::Separate => Stimulation { channels },
            Reduction::Sum | Reduction::Mean => {
                let scale = if self.reduction == Reduction::Mean {
                    1.0 / channels.len().max(1) as f64
                } else {
                    1.0
                };
                let combined = (0..t.len())
                    .map(|i| channels.iter().map(|c| c[i]).sum::<f64>() * scale)
                    .collect();
                Stimulation {
                    channels: vec![combined],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(dt: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * dt).collect()
    }

    #[test]
    fn test_square_pulse_preserves_duty_cycle() {
        // 130 Hz, 60 us pulses sampled at 1 ms: mean level = amp * width * freq
        let t = grid(1e-3, 10_001);
        let u = square_pulse_train(&t, 2.0, 130.0, 60e-6, 0.0);
        let mean = u.iter().sum::<f64>() / u.len() as f64;
        let expected = 2.0 * 60e-6 * 130.0;
        assert!((mean - expected).abs() < 1e-2 * expected, "mean {mean} vs {expected}");
        assert!(u.iter().all(|&x| (0.0..=2.0).contains(&x)));
    }

    #[test]
    fn test_square_pulse_edge_cases() {
        let t = grid(1e-3, 100);
        assert!(square_pulse_train(&t, 1.0, 0.0, 1e-4, 0.0).iter().all(|&x| x == 0.0));
        assert!(square_pulse_train(&t, 1.0, -5.0, 1e-4, 0.0).iter().all(|&x| x == 0.0));
        assert!(square_pulse_train(&t, 1.0, 100.0, 0.0, 0.0).iter().all(|&x| x == 0.0));
        assert!(square_pulse_train(&t, 1.5, 100.0, 0.5, 0.0).iter().all(|&x| x == 1.5));
    }

    #[test]
    fn test_square_pulse_single_sample_point_samples() {
        assert_eq!(square_pulse_train(&[0.0], 3.0, 100.0, 1e-3, 0.0), vec![3.0]);
        assert_eq!(square_pulse_train(&[0.005], 3.0, 100.0, 1e-3, 0.0), vec![0.0]);
    }

    #[test]
    fn test_square_pulse_negative_phase_shift_handled() {
        let t = grid(1e-4, 2000);
        let u = square_pulse_train(&t, 1.0, 50.0, 2e-3, -3.0);
        let mean = u.iter().sum::<f64>() / u.len() as f64;
        assert!((mean - 0.1).abs() < 0.01, "duty cycle 0.1 expected, got {mean}");
    }

    #[test]
    fn test_rectified_sinusoid_non_negative() {
        let t = grid(1e-3, 500);
        let u = rectified_sinusoid(&t, 1.0, 7.0, 0.3);
        assert!(u.iter().all(|&x| x >= 0.0));
        assert!(u.iter().any(|&x| x > 0.9));
    }

    #[test]
    fn test_encoder_reductions() {
        let params = StimParams::new(vec![1.0, 3.0], vec![100.0, 100.0], vec![0.01, 0.01], vec![0.0, 0.0])
            .unwrap();
        let t = grid(1e-3, 50);
        let sum = WaveformEncoder {
            kind: WaveformKind::SquarePulse,
            reduction: Reduction::Sum,
        }
        .encode(&t, &params);
        let mean = WaveformEncoder {
            kind: WaveformKind::SquarePulse,
            reduction: Reduction::Mean,
        }
        .encode(&t, &params);
        let separate = WaveformEncoder {
            kind: WaveformKind::SquarePulse,
            reduction: Reduction::Separate,
        }
        .encode(&t, &params);

        assert_eq!(sum.n_channels(), 1);
        assert_eq!(separate.n_channels(), 2);
        // width == period: constant amplitude
        assert!(sum.primary().iter().all(|&x| (x - 4.0).abs() < 1e-12));
        assert!(mean.primary().iter().all(|&x| (x - 2.0).abs() < 1e-12));
        assert_eq!(separate.channel_mean(), mean.channels[0]);
    }
}
