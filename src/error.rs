//! Error taxonomy for the simulation / severity / optimizer core.
//!
//! Only conditions the caller must act on are represented here. Recoverable
//! numerical situations (surrogate convergence trouble, too few samples,
//! degenerate bounds, zero baseline RMS) are handled locally and reported
//! through result tags such as `FitOutcome` and `SuggestionSource`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed parameter or feature dimensions (caller error, not retried).
    #[error("Invalid input shape for {context}: expected {expected}, got {actual}")]
    InvalidInputShape {
        context: &'static str,
        expected: String,
        actual: String,
    },

    /// Simulation diverged: non-finite values or energy bound exceeded.
    #[error("Simulation unstable: {reason}")]
    Instability { reason: String },

    /// Trained regression artifact is missing.
    #[error("Model artifact not found: {0}")]
    ModelNotFound(PathBuf),

    /// Trained regression artifact exists but cannot be decoded.
    #[error("Model artifact {path} is malformed: {message}")]
    ModelFormat { path: PathBuf, message: String },

    /// Optimizer was called with zero observation rows.
    #[error("Observation history is empty")]
    EmptyHistory,

    /// Persisted history table could not be parsed.
    #[error("History parse error at line {line}: {message}")]
    History { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidInputShape {
            context,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
