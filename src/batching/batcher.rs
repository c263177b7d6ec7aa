//! Chunked batching for truncated backpropagation-through-time.
//!
//! # Algorithm
//!
//! ```text
//! sequences (len_i × dims)
//!     │  longest, time_batch_len, num_time_batches
//!     │  drop len_i > time_batch_len × num_time_batches   (when capped)
//!     ▼
//! zero right-pad every survivor to time_batch_len × num_time_batches
//!     ▼
//! stack → (T_total, N, dims)
//!     ▼
//! shift_targets (zero beyond unrolled length)
//!     ▼
//! split along time → num_time_batches × (time_batch_len, N, dims)
//! ```
//!
//! # Exclusion, not truncation
//!
//! When `max_time_batches` caps the number of chunks, sequences longer than
//! the resulting window are dropped entirely rather than cut down. The number
//! of surviving sequences therefore depends on `max_time_batches`. Every drop
//! is logged at `warn` level and the survivors' input positions are reported in
//! [`BatchedSequences::kept_indices`].

use super::targets::shift_targets;
use crate::error::{BatchError, Result};
use ndarray::{s, Array2, Array3};

/// Output of [`batch_sequences`].
///
/// All per-chunk vectors have exactly `num_time_batches` entries and every
/// input chunk has the same shape as its target chunk:
/// `(time_batch_len, num_sequences, dims)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedSequences {
    /// Input chunks, in time order.
    pub batches: Vec<Array3<f64>>,

    /// Target chunks, aligned with `batches`.
    pub targets: Vec<Array3<f64>>,

    /// Valid steps per chunk and sequence, indexed `[chunk][sequence]`.
    pub rolled_lengths: Vec<Vec<usize>>,

    /// `length - 1` per surviving sequence.
    pub unrolled_lengths: Vec<usize>,

    /// Positions (in the input slice) of the sequences that survived filtering.
    pub kept_indices: Vec<usize>,

    /// Chunk duration actually used (resolved from `None` to the longest length).
    pub time_batch_len: usize,
}

impl BatchedSequences {
    /// Number of chunks.
    pub fn num_time_batches(&self) -> usize {
        self.batches.len()
    }

    /// Number of surviving sequences.
    pub fn num_sequences(&self) -> usize {
        self.unrolled_lengths.len()
    }

    /// Channel count shared by every chunk.
    pub fn dims(&self) -> usize {
        self.batches.first().map(|b| b.dim().2).unwrap_or(0)
    }
}

/// Rolled length of a sequence inside chunk `chunk`.
///
/// Zero when the chunk starts at or after the unrolled length, otherwise the
/// number of valid steps of the sequence inside the chunk.
#[inline]
pub fn rolled_length(unrolled_length: usize, chunk: usize, time_batch_len: usize) -> usize {
    let start = chunk * time_batch_len;
    if unrolled_length <= start {
        0
    } else {
        time_batch_len.min(unrolled_length - start)
    }
}

/// Batch variable-length sequences into equal-duration chunks.
///
/// # Arguments
///
/// * `sequences` - 2-D arrays of shape `(length, dims)` sharing `dims`
/// * `time_batch_len` - chunk duration; `None` uses the longest sequence length
/// * `max_time_batches` - cap on the number of chunks; `None` is unbounded
///
/// # Errors
///
/// - [`BatchError::EmptyInput`] when `sequences` is empty, a sequence has no
///   time steps, or filtering removes every sequence
/// - [`BatchError::ShapeMismatch`] when sequences disagree on `dims`
/// - [`BatchError::InvalidConfig`] when `time_batch_len` is `Some(0)` or the
///   padded stack would be too large to allocate
///
/// # Example
///
/// ```
/// use ndarray::Array2;
/// use pianoroll_batcher::batching::batch_sequences;
///
/// let sequences = vec![Array2::<f64>::ones((5, 2)), Array2::<f64>::ones((3, 2))];
/// let batched = batch_sequences(&sequences, Some(3), None).unwrap();
///
/// assert_eq!(batched.num_time_batches(), 2);
/// assert_eq!(batched.unrolled_lengths, vec![4, 2]);
/// assert_eq!(batched.rolled_lengths, vec![vec![3, 2], vec![1, 0]]);
/// ```
pub fn batch_sequences(
    sequences: &[Array2<f64>],
    time_batch_len: Option<usize>,
    max_time_batches: Option<usize>,
) -> Result<BatchedSequences> {
    let dims = validate_sequences(sequences)?;

    let lengths: Vec<usize> = sequences.iter().map(|s| s.nrows()).collect();
    // validate_sequences guarantees at least one non-empty sequence
    let longest = lengths.iter().copied().max().unwrap_or(0);

    let time_batch_len = match time_batch_len {
        Some(0) => return Err(BatchError::config("time_batch_len must be > 0")),
        Some(len) => len,
        None => longest,
    };

    log::info!(
        "Average sequence length: {:.1}, longest: {}, sequences: {}",
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        longest,
        sequences.len()
    );

    let total_time_batches = longest.div_ceil(time_batch_len);

    let num_time_batches = match max_time_batches {
        Some(max_batches) => total_time_batches.min(max_batches),
        None => total_time_batches,
    };
    let total_len = padded_len(time_batch_len, num_time_batches)?;

    let kept_indices: Vec<usize> = match max_time_batches {
        Some(_) => {
            let kept: Vec<usize> = lengths
                .iter()
                .enumerate()
                .filter(|&(_, &len)| len <= total_len)
                .map(|(idx, _)| idx)
                .collect();

            let dropped = sequences.len() - kept.len();
            if dropped > 0 {
                log::warn!(
                    "Dropping {} of {} sequences longer than {} steps ({} chunks x {})",
                    dropped,
                    sequences.len(),
                    total_len,
                    num_time_batches,
                    time_batch_len
                );
            }
            kept
        }
        None => (0..sequences.len()).collect(),
    };

    log::info!(
        "Time batches: {}, sequences after filtering: {}",
        num_time_batches,
        kept_indices.len()
    );

    if kept_indices.is_empty() {
        return Err(BatchError::empty(format!(
            "all {} sequences exceed {} steps",
            sequences.len(),
            total_len
        )));
    }
    check_element_count(total_len, kept_indices.len(), dims)?;

    let unrolled_lengths: Vec<usize> = kept_indices.iter().map(|&i| lengths[i] - 1).collect();

    // Zero-padded stack with the sequence axis in the middle.
    let mut stacked = Array3::<f64>::zeros((total_len, kept_indices.len(), dims));
    for (slot, &idx) in kept_indices.iter().enumerate() {
        let sequence = &sequences[idx];
        stacked
            .slice_mut(s![..sequence.nrows(), slot, ..])
            .assign(sequence);
    }

    let (all_batches, all_targets) = shift_targets(stacked, &unrolled_lengths)?;

    debug_assert_eq!(all_batches.dim(), all_targets.dim());
    debug_assert_eq!(all_batches.dim().1, kept_indices.len());
    debug_assert_eq!(all_batches.dim().2, dims);

    let split = |array: &Array3<f64>| -> Vec<Array3<f64>> {
        (0..num_time_batches)
            .map(|t| {
                array
                    .slice(s![t * time_batch_len..(t + 1) * time_batch_len, .., ..])
                    .to_owned()
            })
            .collect()
    };
    let batches = split(&all_batches);
    let targets = split(&all_targets);

    let rolled_lengths: Vec<Vec<usize>> = (0..num_time_batches)
        .map(|t| {
            unrolled_lengths
                .iter()
                .map(|&len| rolled_length(len, t, time_batch_len))
                .collect()
        })
        .collect();

    Ok(BatchedSequences {
        batches,
        targets,
        rolled_lengths,
        unrolled_lengths,
        kept_indices,
        time_batch_len,
    })
}

/// Padded duration `time_batch_len * num_time_batches`, rejecting overflow.
fn padded_len(time_batch_len: usize, num_time_batches: usize) -> Result<usize> {
    time_batch_len.checked_mul(num_time_batches).ok_or_else(|| {
        BatchError::config(format!(
            "{num_time_batches} chunks of {time_batch_len} steps overflow the time axis"
        ))
    })
}

/// Reject stacks whose element count cannot be allocated as one `f64` array.
fn check_element_count(total_len: usize, sequences: usize, dims: usize) -> Result<()> {
    let limit = isize::MAX as usize / std::mem::size_of::<f64>();
    match total_len
        .checked_mul(sequences)
        .and_then(|n| n.checked_mul(dims))
    {
        Some(elements) if elements <= limit => Ok(()),
        _ => Err(BatchError::config(format!(
            "padded stack of {total_len} x {sequences} x {dims} is too large"
        ))),
    }
}

/// Check that there is something to batch and that channel counts agree.
///
/// Returns the shared channel count.
fn validate_sequences(sequences: &[Array2<f64>]) -> Result<usize> {
    let first = sequences
        .first()
        .ok_or_else(|| BatchError::empty("no sequences to batch"))?;
    let dims = first.ncols();

    for (idx, sequence) in sequences.iter().enumerate() {
        if sequence.nrows() == 0 {
            return Err(BatchError::empty(format!("sequence {idx} has no time steps")));
        }
        if sequence.ncols() != dims {
            return Err(BatchError::shape(format!(
                "sequence {} has {} channels, expected {}",
                idx,
                sequence.ncols(),
                dims
            )));
        }
    }

    Ok(dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Sequence whose frame `t` holds `base + t` in every channel.
    fn seq(len: usize, dims: usize, base: f64) -> Array2<f64> {
        Array2::from_shape_fn((len, dims), |(t, _)| base + t as f64)
    }

    #[test]
    fn test_rolled_length_formula() {
        assert_eq!(rolled_length(4, 0, 3), 3);
        assert_eq!(rolled_length(4, 1, 3), 1);
        assert_eq!(rolled_length(2, 1, 3), 0);
        assert_eq!(rolled_length(3, 1, 3), 0);
        assert_eq!(rolled_length(0, 0, 3), 0);
    }

    #[test]
    fn test_two_sequences_two_chunks() {
        let batched =
            batch_sequences(&[seq(5, 2, 1.0), seq(3, 2, 11.0)], Some(3), None).unwrap();

        assert_eq!(batched.num_time_batches(), 2);
        assert_eq!(batched.unrolled_lengths, vec![4, 2]);
        assert_eq!(batched.rolled_lengths, vec![vec![3, 2], vec![1, 0]]);
        assert_eq!(batched.kept_indices, vec![0, 1]);
        for (b, t) in batched.batches.iter().zip(&batched.targets) {
            assert_eq!(b.dim(), (3, 2, 2));
            assert_eq!(b.dim(), t.dim());
        }
    }

    #[test]
    fn test_unbounded_time_batch_len_uses_longest() {
        let batched = batch_sequences(&[seq(7, 1, 1.0), seq(2, 1, 1.0)], None, None).unwrap();
        assert_eq!(batched.time_batch_len, 7);
        assert_eq!(batched.num_time_batches(), 1);
        assert_eq!(batched.batches[0].dim(), (7, 2, 1));
    }

    #[test]
    fn test_overlength_sequence_dropped() {
        let result = batch_sequences(&[seq(10, 1, 1.0)], Some(4), Some(2));
        assert!(matches!(result, Err(BatchError::EmptyInput(_))));
    }

    #[test]
    fn test_filtering_keeps_boundary_length() {
        // max_len = 2 * 4 = 8
        let sequences = [seq(8, 1, 1.0), seq(9, 1, 1.0), seq(3, 1, 1.0), seq(12, 1, 1.0)];
        let batched = batch_sequences(&sequences, Some(4), Some(2)).unwrap();

        assert_eq!(batched.kept_indices, vec![0, 2]);
        assert_eq!(batched.unrolled_lengths, vec![7, 2]);
        assert_eq!(batched.num_time_batches(), 2);
    }

    #[test]
    fn test_max_time_batches_larger_than_needed() {
        let batched = batch_sequences(&[seq(5, 1, 1.0)], Some(2), Some(10)).unwrap();
        assert_eq!(batched.num_time_batches(), 3);
    }

    #[test]
    fn test_empty_input() {
        let result = batch_sequences(&[], Some(4), None);
        assert!(matches!(result, Err(BatchError::EmptyInput(_))));
    }

    #[test]
    fn test_zero_length_sequence() {
        let result = batch_sequences(&[seq(3, 2, 1.0), Array2::zeros((0, 2))], Some(2), None);
        assert!(matches!(result, Err(BatchError::EmptyInput(_))));
    }

    #[test]
    fn test_dims_mismatch() {
        let result = batch_sequences(&[seq(3, 2, 1.0), seq(3, 3, 1.0)], Some(2), None);
        assert!(matches!(result, Err(BatchError::ShapeMismatch(_))));
    }

    #[test]
    fn test_zero_time_batch_len() {
        let result = batch_sequences(&[seq(3, 2, 1.0)], Some(0), None);
        assert!(matches!(result, Err(BatchError::InvalidConfig(_))));
    }

    #[test]
    fn test_targets_align_across_chunk_boundary() {
        let batched = batch_sequences(&[seq(5, 1, 1.0)], Some(2), None).unwrap();
        // frames: 1 2 3 4 5 | pad 0; unrolled = 4
        // inputs: [1 2] [3 4] [0 0]; targets: [2 3] [4 5] [0 0]
        let inputs: Vec<f64> = batched.batches.iter().flat_map(|b| b.iter().copied()).collect();
        let targets: Vec<f64> = batched.targets.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(inputs, vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
        assert_eq!(targets, vec![2.0, 3.0, 4.0, 5.0, 0.0, 0.0]);
        assert_eq!(batched.rolled_lengths, vec![vec![2], vec![2], vec![0]]);
    }

    #[test]
    fn test_single_step_sequence() {
        let batched = batch_sequences(&[seq(1, 3, 1.0)], None, None).unwrap();
        assert_eq!(batched.unrolled_lengths, vec![0]);
        assert_eq!(batched.rolled_lengths, vec![vec![0]]);
        assert!(batched.batches[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_huge_time_batch_len_is_config_error() {
        let result = batch_sequences(&[seq(3, 2, 1.0)], Some(usize::MAX), None);
        assert!(matches!(result, Err(BatchError::InvalidConfig(_))));

        let result = batch_sequences(&[seq(3, 2, 1.0)], Some(usize::MAX / 2), Some(4));
        assert!(matches!(result, Err(BatchError::InvalidConfig(_))));
    }

    #[test]
    fn test_padded_len_overflow() {
        assert!(padded_len(usize::MAX, 2).is_err());
        assert_eq!(padded_len(4, 3).unwrap(), 12);
    }
}
