//! Model-based severity: pre-trained regressor over sliding IMU windows.
//!
//! The nine-channel signal `(pos, vel, acc)` is cut into overlapping windows,
//! channel-normalised, scored window by window and averaged.
//!
//! ## Artifact format
//!
//! JSON, tagged by `kind`:
//!
//! - `tree_ensemble`: boosted regression trees over the flattened window
//!   (feature index `t * 9 + c`). Output is `tanh(base_score + sum(leaves))`.
//! - `conv1d`: same-padded 1-D convolutions with ReLU, global average pool,
//!   dense head with ReLU between layers and `tanh` on the single output.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::defaults::CHANNEL_STD_FLOOR;
use crate::error::{CoreError, CoreResult};
use crate::types::MeasurementOutput;

pub const N_CHANNELS: usize = 9;

pub type Sample = [f64; N_CHANNELS];

/// Overlapping windows of `window` samples taken every `stride` samples.
///
/// A trailing partial window is dropped.
pub fn make_windows(samples: &[Sample], window: usize, stride: usize) -> CoreResult<Vec<&[Sample]>> {
    if window == 0 || stride == 0 {
        return Err(CoreError::shape(
            "severity windows",
            "window > 0 and stride > 0",
            format!("window {window}, stride {stride}"),
        ));
    }
    if samples.len() < window {
        return Err(CoreError::shape(
            "severity windows",
            format!("at least {window} samples"),
            format!("{} samples", samples.len()),
        ));
    }
    Ok((0..=samples.len() - window)
        .step_by(stride)
        .map(|start| &samples[start..start + window])
        .collect())
}

// ============================================================================
// Channel normalisation
// ============================================================================

/// Per-channel affine normalisation fitted on the training windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelNorm {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Default for ChannelNorm {
    fn default() -> Self {
        Self {
            mean: vec![0.0; N_CHANNELS],
            std: vec![1.0; N_CHANNELS],
        }
    }
}

impl ChannelNorm {
    /// Fit mean and population std over every sample of every window.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(windows: &[&[Sample]]) -> Self {
        let count: usize = windows.iter().map(|w| w.len()).sum();
        if count == 0 {
            return Self::default();
        }
        let n = count as f64;
        let mut mean = vec![0.0; N_CHANNELS];
        for s in windows.iter().flat_map(|w| w.iter()) {
            for (m, x) in mean.iter_mut().zip(s) {
                *m += x / n;
            }
        }
        let mut var = vec![0.0; N_CHANNELS];
        for s in windows.iter().flat_map(|w| w.iter()) {
            for c in 0..N_CHANNELS {
                let d = s[c] - mean[c];
                var[c] += d * d / n;
            }
        }
        let std = var
            .into_iter()
            .map(|v| {
                let s = v.sqrt();
                if s < CHANNEL_STD_FLOOR {
                    1.0
                } else {
                    s
                }
            })
            .collect();
        Self { mean, std }
    }

    pub fn apply(&self, sample: &Sample) -> Sample {
        let mut out = [0.0; N_CHANNELS];
        for c in 0..N_CHANNELS {
            let std = if self.std[c].abs() < CHANNEL_STD_FLOOR { 1.0 } else { self.std[c] };
            out[c] = (sample[c] - self.mean[c]) / std;
        }
        out
    }

    fn check(&self) -> Result<(), String> {
        if self.mean.len() != N_CHANNELS || self.std.len() != N_CHANNELS {
            return Err(format!(
                "channel norm needs {N_CHANNELS} means and stds, got {} and {}",
                self.mean.len(),
                self.std.len()
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tree ensemble
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Branch taken when the feature is absent from the window
        #[serde(default = "default_true")]
        default_left: bool,
    },
    Leaf {
        leaf: f64,
    },
}

const fn default_true() -> bool {
    true
}

/// One regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        // Node indices are validated at load, so a walk ends within `nodes.len()` steps
        for _ in 0..=self.nodes.len() {
            match &self.nodes[idx] {
                TreeNode::Leaf { leaf } => return *leaf,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    idx = match features.get(*feature) {
                        Some(x) if x.is_finite() => {
                            if x < threshold {
                                *left
                            } else {
                                *right
                            }
                        }
                        _ if *default_left => *left,
                        _ => *right,
                    };
                }
            }
        }
        0.0
    }

    fn check(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree without nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                // children must point forward, which also rules out cycles
                if *left <= i || *right <= i || *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(format!("node {i} has invalid children ({left}, {right})"));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Convolutional regressor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvLayer {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    /// Row-major `[out][in][k]`
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

impl ConvLayer {
    /// Same-padded convolution followed by ReLU. `x` is `[in][len]`.
    fn forward(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let len = x.first().map_or(0, Vec::len);
        let pad = self.kernel_size / 2;
        let k = self.kernel_size;
        (0..self.out_channels)
            .map(|o| {
                (0..len)
                    .map(|t| {
                        let mut acc = self.bias[o];
                        for (c, row) in x.iter().enumerate() {
                            let w = &self.weights[(o * self.in_channels + c) * k..][..k];
                            for (j, wj) in w.iter().enumerate() {
                                let src = t + j;
                                if src >= pad && src - pad < len {
                                    acc += wj * row[src - pad];
                                }
                            }
                        }
                        acc.max(0.0)
                    })
                    .collect()
            })
            .collect()
    }

    fn check(&self) -> Result<(), String> {
        if self.kernel_size == 0 {
            return Err("conv kernel_size must be > 0".to_string());
        }
        let expected = self.out_channels * self.in_channels * self.kernel_size;
        if self.weights.len() != expected || self.bias.len() != self.out_channels {
            return Err(format!(
                "conv layer {}x{}x{} has {} weights and {} biases",
                self.out_channels,
                self.in_channels,
                self.kernel_size,
                self.weights.len(),
                self.bias.len()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub inputs: usize,
    pub outputs: usize,
    /// Row-major `[out][in]`
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn forward(&self, x: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..][..self.inputs];
                self.bias[o] + row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
            })
            .collect()
    }

    fn check(&self) -> Result<(), String> {
        if self.weights.len() != self.inputs * self.outputs || self.bias.len() != self.outputs {
            return Err(format!(
                "dense layer {}x{} has {} weights and {} biases",
                self.outputs,
                self.inputs,
                self.weights.len(),
                self.bias.len()
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Model
// ============================================================================

/// A trained window regressor, owned by the caller and lent to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorModel {
    TreeEnsemble {
        #[serde(default)]
        norm: Option<ChannelNorm>,
        #[serde(default)]
        base_score: f64,
        trees: Vec<RegressionTree>,
    },
    Conv1d {
        norm: ChannelNorm,
        conv: Vec<ConvLayer>,
        dense: Vec<DenseLayer>,
    },
}

impl RegressorModel {
    /// Read and check a JSON artifact.
    ///
    /// A missing file is `ModelNotFound`; anything unreadable or
    /// inconsistent is `ModelFormat`.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ModelNotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;
        let format_err = |message: String| CoreError::ModelFormat {
            path: path.to_path_buf(),
            message,
        };
        let model: Self = serde_json::from_slice(&data).map_err(|e| format_err(e.to_string()))?;
        model.check().map_err(format_err)?;
        info!(path = %path.display(), kind = model.kind(), "Loaded severity regressor");
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| CoreError::ModelFormat {
            path: PathBuf::from(path),
            message: e.to_string(),
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TreeEnsemble { .. } => "tree_ensemble",
            Self::Conv1d { .. } => "conv1d",
        }
    }

    /// Structural consistency of the artifact.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Self::TreeEnsemble { norm, trees, .. } => {
                if let Some(norm) = norm {
                    norm.check()?;
                }
                if trees.is_empty() {
                    return Err("tree ensemble without trees".to_string());
                }
                trees.iter().try_for_each(RegressionTree::check)
            }
            Self::Conv1d { norm, conv, dense } => {
                norm.check()?;
                let mut channels = N_CHANNELS;
                for layer in conv {
                    layer.check()?;
                    if layer.in_channels != channels {
                        return Err(format!(
                            "conv layer expects {} channels, previous layer gives {channels}",
                            layer.in_channels
                        ));
                    }
                    channels = layer.out_channels;
                }
                let mut width = channels;
                for layer in dense {
                    layer.check()?;
                    if layer.inputs != width {
                        return Err(format!(
                            "dense layer expects {} inputs, previous layer gives {width}",
                            layer.inputs
                        ));
                    }
                    width = layer.outputs;
                }
                if width != 1 {
                    return Err(format!("regressor head must end in 1 output, got {width}"));
                }
                Ok(())
            }
        }
    }

    /// Score one window into (-1, 1).
    pub fn predict_window(&self, window: &[Sample]) -> f64 {
        match self {
            Self::TreeEnsemble {
                norm,
                base_score,
                trees,
            } => {
                let features: Vec<f64> = window
                    .iter()
                    .flat_map(|s| norm.as_ref().map_or(*s, |n| n.apply(s)))
                    .collect();
                let raw: f64 = base_score + trees.iter().map(|t| t.predict(&features)).sum::<f64>();
                raw.tanh()
            }
            Self::Conv1d { norm, conv, dense } => {
                // channel-major layout [c][t]
                let mut x: Vec<Vec<f64>> = vec![Vec::with_capacity(window.len()); N_CHANNELS];
                for s in window {
                    for (c, v) in norm.apply(s).iter().enumerate() {
                        x[c].push(*v);
                    }
                }
                for layer in conv {
                    x = layer.forward(&x);
                }
                #[allow(clippy::cast_precision_loss)]
                let mut h: Vec<f64> = x
                    .iter()
                    .map(|row| {
                        if row.is_empty() {
                            0.0
                        } else {
                            row.iter().sum::<f64>() / row.len() as f64
                        }
                    })
                    .collect();
                let last = dense.len().saturating_sub(1);
                for (i, layer) in dense.iter().enumerate() {
                    h = layer.forward(&h);
                    if i < last {
                        h.iter_mut().for_each(|v| *v = v.max(0.0));
                    }
                }
                h.first().copied().unwrap_or(0.0).tanh()
            }
        }
    }

    /// Mean window score of one rollout, clamped to [-1, 1].
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, output: &MeasurementOutput, window: usize, stride: usize) -> CoreResult<f64> {
        let samples = output.to_nine_channel();
        let windows = make_windows(&samples, window, stride)?;
        let total: f64 = windows.iter().map(|w| self.predict_window(w)).sum();
        Ok((total / windows.len() as f64).clamp(-1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(threshold: f64, left: f64, right: f64, feature: usize) -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                    default_left: true,
                },
                TreeNode::Leaf { leaf: left },
                TreeNode::Leaf { leaf: right },
            ],
        }
    }

    #[test]
    fn test_windows_count_and_short_input() {
        let samples = vec![[0.0; 9]; 600];
        let windows = make_windows(&samples, 256, 128).unwrap();
        // starts 0, 128, 256 (384 + 256 > 600)
        assert_eq!(windows.len(), 3);
        assert!(windows.iter().all(|w| w.len() == 256));

        let err = make_windows(&samples[..100], 256, 128).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInputShape { .. }));
    }

    #[test]
    fn test_channel_norm_floors_flat_channels() {
        let samples: Vec<Sample> = (0..10)
            .map(|i| {
                let mut s = [1.0; 9];
                s[0] = f64::from(i);
                s
            })
            .collect();
        let norm = ChannelNorm::fit(&[&samples[..]]);
        assert!((norm.mean[0] - 4.5).abs() < 1e-12);
        assert_eq!(norm.std[1], 1.0);
        let z = norm.apply(&samples[0]);
        assert!(z[0] < 0.0);
        assert_eq!(z[1], 0.0);
    }

    #[test]
    fn test_tree_ensemble_prediction() {
        let model = RegressorModel::TreeEnsemble {
            norm: None,
            base_score: 0.0,
            trees: vec![stump(0.5, -2.0, 2.0, 0)],
        };
        assert!(model.check().is_ok());
        let low = vec![[0.0; 9]; 4];
        let high = vec![[1.0; 9]; 4];
        assert!((model.predict_window(&low) - (-2.0_f64).tanh()).abs() < 1e-12);
        assert!((model.predict_window(&high) - 2.0_f64.tanh()).abs() < 1e-12);
    }

    #[test]
    fn test_missing_feature_takes_default_branch() {
        let model = RegressorModel::TreeEnsemble {
            norm: None,
            base_score: 0.1,
            trees: vec![stump(0.0, 0.3, -0.3, 10_000)],
        };
        let w = vec![[0.0; 9]; 2];
        assert!((model.predict_window(&w) - 0.4_f64.tanh()).abs() < 1e-12);
    }

    #[test]
    fn test_cyclic_tree_rejected() {
        let tree = RegressionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
                default_left: true,
            }],
        };
        assert!(tree.check().is_err());
    }

    fn identity_cnn() -> RegressorModel {
        // one conv channel summing channel 0 with a unit centre tap
        let mut weights = vec![0.0; 9 * 3];
        weights[1] = 1.0;
        RegressorModel::Conv1d {
            norm: ChannelNorm::default(),
            conv: vec![ConvLayer {
                in_channels: 9,
                out_channels: 1,
                kernel_size: 3,
                weights,
                bias: vec![0.0],
            }],
            dense: vec![DenseLayer {
                inputs: 1,
                outputs: 1,
                weights: vec![1.0],
                bias: vec![0.0],
            }],
        }
    }

    #[test]
    fn test_conv_forward_pool_and_tanh() {
        let model = identity_cnn();
        assert!(model.check().is_ok());
        let mut w = vec![[0.0; 9]; 4];
        for (i, s) in w.iter_mut().enumerate() {
            s[0] = i as f64; // 0,1,2,3 -> mean 1.5
        }
        assert!((model.predict_window(&w) - 1.5_f64.tanh()).abs() < 1e-12);

        // ReLU clips negative activations
        let neg = vec![[-1.0; 9]; 4];
        assert_eq!(model.predict_window(&neg), 0.0);
    }

    #[test]
    fn test_conv_shape_mismatch_rejected() {
        let RegressorModel::Conv1d { norm, conv, .. } = identity_cnn() else {
            unreachable!()
        };
        let model = RegressorModel::Conv1d {
            norm,
            conv,
            dense: vec![DenseLayer {
                inputs: 2,
                outputs: 1,
                weights: vec![1.0, 1.0],
                bias: vec![0.0],
            }],
        };
        assert!(model.check().is_err());
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            RegressorModel::load(&missing),
            Err(CoreError::ModelNotFound(_))
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"kind\": \"forest\"}").unwrap();
        assert!(matches!(
            RegressorModel::load(&bad),
            Err(CoreError::ModelFormat { .. })
        ));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cnn.json");
        let model = identity_cnn();
        model.save(&path).unwrap();
        assert_eq!(RegressorModel::load(&path).unwrap(), model);
    }
}
