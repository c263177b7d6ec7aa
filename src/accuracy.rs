//! Frame-level accuracy of predicted note probabilities.
//!
//! Chunks are stitched back into full-length arrays. Step 0 has no earlier
//! prediction, so for each sequence steps `1..unrolled_length` are scored by
//! comparing the probabilities emitted at `i - 1` with the ground truth at `i`.
//!
//! The ground truth of step `i` is frame `i` itself, so the truth chunks of a
//! split are its input `batches`. Passing the shifted `targets` instead scores
//! every prediction against the frame after the one it predicts. Both wirings
//! are accepted and counted the same way; only the frame being scored moves.
//! Loops that hand their target chunks to this function measure two-step-ahead
//! prediction, so a model that repeats its input can score higher than one
//! that predicts the next frame exactly.
//!
//! Score: `TP / (TP + FP + FN)` where, per channel,
//! - target 0: every "on" draw is a false positive
//! - target non-zero: "on" draws are true positives, "off" draws false negatives
//!
//! # Example
//!
//! ```ignore
//! use pianoroll_batcher::accuracy::{accuracy, AccuracyConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let output = run_epoch(&mut model, &dataset.test, EpochOptions::testing())?;
//! let probs = output.probabilities.unwrap_or_default();
//! let config = AccuracyConfig::for_split(&dataset.test);
//! let mut rng = StdRng::seed_from_u64(42);
//! let score = accuracy(&probs, &dataset.test.batches, &dataset.test.unrolled_lengths, &config, &mut rng)?;
//! ```

use crate::config::BatchingConfig;
use crate::dataset::SplitData;
use crate::error::{BatchError, Result};
use ndarray::{concatenate, Array3, ArrayView3, Axis};
use rand::distr::{Bernoulli, Distribution};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default number of Bernoulli draws per probability.
pub const DEFAULT_NUM_SAMPLES: usize = 20;

/// How probabilities are turned into counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyMethod {
    /// `num_samples` Bernoulli draws per probability
    #[default]
    Sampled,

    /// Expected counts (`p * num_samples`), no randomness
    Expected,
}

/// Expected shapes and sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyConfig {
    /// Sequences per chunk (N)
    pub batch_size: usize,

    /// Steps per chunk (L)
    pub time_batch_len: usize,

    /// Channels per step (D)
    pub input_dim: usize,

    /// Draws per probability
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    #[serde(default)]
    pub method: AccuracyMethod,
}

fn default_num_samples() -> usize {
    DEFAULT_NUM_SAMPLES
}

impl AccuracyConfig {
    pub fn new(batch_size: usize, time_batch_len: usize, input_dim: usize) -> Self {
        Self {
            batch_size,
            time_batch_len,
            input_dim,
            num_samples: DEFAULT_NUM_SAMPLES,
            method: AccuracyMethod::Sampled,
        }
    }

    /// Shapes taken from an assembled split.
    pub fn for_split(split: &SplitData) -> Self {
        Self::new(split.num_sequences(), split.time_batch_len, split.input_dim())
    }

    /// Shapes from `split`, sample count from `batching`. A fixed
    /// `batching.batch_size` replaces the split's sequence count, so a split
    /// of a different size is rejected when scored.
    pub fn from_batching(batching: &BatchingConfig, split: &SplitData) -> Self {
        let batch_size = batching.batch_size.unwrap_or_else(|| split.num_sequences());
        Self::new(batch_size, split.time_batch_len, split.input_dim())
            .with_num_samples(batching.num_samples)
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn with_method(mut self, method: AccuracyMethod) -> Self {
        self.method = method;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_samples == 0 {
            return Err(BatchError::config("num_samples must be > 0"));
        }
        if self.time_batch_len == 0 {
            return Err(BatchError::config("time_batch_len must be > 0"));
        }
        Ok(())
    }

    fn chunk_shape(&self) -> (usize, usize, usize) {
        (self.time_batch_len, self.batch_size, self.input_dim)
    }
}

/// Confusion counts. Fractional under [`AccuracyMethod::Expected`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyCounts {
    pub true_positives: f64,
    pub false_positives: f64,
    pub false_negatives: f64,
}

impl AccuracyCounts {
    /// Add another set of counts (e.g. from a second split or run).
    pub fn merge(&mut self, other: &AccuracyCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }

    /// `TP / (TP + FP + FN)`.
    pub fn score(&self) -> Result<f64> {
        let denom = self.true_positives + self.false_positives + self.false_negatives;
        if denom <= 0.0 {
            return Err(BatchError::DegenerateAccuracy);
        }
        Ok(self.true_positives / denom)
    }
}

/// Accuracy of `prob_chunks` against `target_chunks`.
///
/// See [`accuracy_counts`] for the counting rules and errors.
pub fn accuracy<R: Rng + ?Sized>(
    prob_chunks: &[Array3<f64>],
    target_chunks: &[Array3<f64>],
    unrolled_lengths: &[usize],
    config: &AccuracyConfig,
    rng: &mut R,
) -> Result<f64> {
    accuracy_counts(prob_chunks, target_chunks, unrolled_lengths, config, rng)?.score()
}

/// Confusion counts of `prob_chunks` against `target_chunks`.
///
/// `target_chunks` hold the ground-truth frame of every step (the input
/// chunks of a split). Every chunk must have shape `(time_batch_len, batch_size, input_dim)` and
/// `unrolled_lengths` must hold `batch_size` entries. For sequence `s`, steps
/// `1 <= i < unrolled_lengths[s]` are scored.
///
/// # Errors
///
/// - [`BatchError::EmptyInput`] if there are no chunks
/// - [`BatchError::ShapeMismatch`] on any shape disagreement
/// - [`BatchError::InvalidProbability`] on a NaN probability
pub fn accuracy_counts<R: Rng + ?Sized>(
    prob_chunks: &[Array3<f64>],
    target_chunks: &[Array3<f64>],
    unrolled_lengths: &[usize],
    config: &AccuracyConfig,
    rng: &mut R,
) -> Result<AccuracyCounts> {
    config.validate()?;
    let probs = stitch("probabilities", prob_chunks, config)?;
    let targets = stitch("targets", target_chunks, config)?;

    if prob_chunks.len() != target_chunks.len() {
        return Err(BatchError::shape(format!(
            "{} probability chunks vs {} target chunks",
            prob_chunks.len(),
            target_chunks.len()
        )));
    }
    if unrolled_lengths.len() != config.batch_size {
        return Err(BatchError::shape(format!(
            "{} unrolled lengths for batch size {}",
            unrolled_lengths.len(),
            config.batch_size
        )));
    }

    let total_steps = probs.len_of(Axis(0));
    let mut counts = AccuracyCounts::default();

    for (s, &unrolled) in unrolled_lengths.iter().enumerate() {
        for i in 1..unrolled.min(total_steps) {
            for c in 0..config.input_dim {
                let p = checked_probability(probs[[i - 1, s, c]], i - 1, s, c)?;
                let (on, off) = match config.method {
                    AccuracyMethod::Sampled => sample(p, config.num_samples, rng, (i - 1, s, c))?,
                    AccuracyMethod::Expected => {
                        let n = config.num_samples as f64;
                        (p * n, (1.0 - p) * n)
                    }
                };

                if targets[[i, s, c]] == 0.0 {
                    counts.false_positives += on;
                } else {
                    counts.true_positives += on;
                    counts.false_negatives += off;
                }
            }
        }
    }

    log::debug!(
        "accuracy counts: tp={:.1} fp={:.1} fn={:.1}",
        counts.true_positives,
        counts.false_positives,
        counts.false_negatives
    );
    Ok(counts)
}

fn stitch(what: &str, chunks: &[Array3<f64>], config: &AccuracyConfig) -> Result<Array3<f64>> {
    if chunks.is_empty() {
        return Err(BatchError::empty(format!("no {what} chunks")));
    }
    let expected = config.chunk_shape();
    for (t, chunk) in chunks.iter().enumerate() {
        if chunk.dim() != expected {
            return Err(BatchError::shape(format!(
                "{} chunk {}: expected {:?}, got {:?}",
                what,
                t,
                expected,
                chunk.dim()
            )));
        }
    }
    let views: Vec<ArrayView3<'_, f64>> = chunks.iter().map(|c| c.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| BatchError::shape(e.to_string()))
}

fn checked_probability(value: f64, step: usize, sequence: usize, channel: usize) -> Result<f64> {
    if value.is_nan() {
        return Err(BatchError::InvalidProbability {
            value,
            step,
            sequence,
            channel,
        });
    }
    Ok(value.clamp(0.0, 1.0))
}

fn sample<R: Rng + ?Sized>(
    p: f64,
    num_samples: usize,
    rng: &mut R,
    (step, sequence, channel): (usize, usize, usize),
) -> Result<(f64, f64)> {
    let dist = Bernoulli::new(p).map_err(|_| BatchError::InvalidProbability {
        value: p,
        step,
        sequence,
        channel,
    })?;
    let mut on = 0usize;
    for _ in 0..num_samples {
        if dist.sample(rng) {
            on += 1;
        }
    }
    Ok((on as f64, (num_samples - on) as f64))
}
