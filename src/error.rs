//! Error types for batching, dataset assembly and evaluation.
//!
//! Structural problems (empty input, disagreeing channel counts, a zero
//! accuracy denominator) each get their own variant so callers can match on
//! them. Everything else is ambient I/O and (de)serialization plumbing.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors produced while loading, batching, running or scoring sequences.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Sequences (or dataset splits) disagree on channel dimensionality,
    /// or an array does not have the shape an operation expects.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// No sequences to batch, a sequence without time steps, or every
    /// sequence was filtered out.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// true_positives + false_positives + false_negatives == 0.
    #[error("accuracy is undefined: no positive predictions or ground-truth positives were evaluated")]
    DegenerateAccuracy,

    /// A predicted probability is NaN.
    #[error("invalid probability {value} at step {step}, sequence {sequence}, channel {channel}")]
    InvalidProbability {
        /// Offending value
        value: f64,
        /// Time step of the prediction
        step: usize,
        /// Sequence index within the batch
        sequence: usize,
        /// Channel index
        channel: usize,
    },

    /// Configuration values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raw sequences failed value or shape checks before batching.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The recurrent model reported a failure or broke its contract.
    #[error("model error: {0}")]
    Model(String),

    /// Rayon thread pool could not be created.
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("failed to read .npy: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("failed to write .npy: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),
}

impl BatchError {
    /// Convenience constructor for shape errors.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Convenience constructor for empty-input errors.
    pub fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }

    /// Convenience constructor for configuration errors.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = BatchError::shape("dims 3 vs 4");
        assert_eq!(err.to_string(), "shape mismatch: dims 3 vs 4");

        let err = BatchError::empty("no sequences");
        assert!(err.to_string().contains("no sequences"));

        assert!(BatchError::DegenerateAccuracy
            .to_string()
            .contains("undefined"));
    }

    #[test]
    fn test_io_conversion() {
        fn open_missing() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/definitely/not/here.npy")?)
        }
        assert!(matches!(open_missing(), Err(BatchError::Io(_))));
    }
}
