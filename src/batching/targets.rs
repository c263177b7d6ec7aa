//! Next-step prediction targets.
//!
//! Targets are the input rolled back by one time step, so that
//! `targets[i, s, :] == data[i + 1, s, :]`. Past a sequence's unrolled length
//! there is no successor to predict, so both the input and the target are
//! zeroed there. Zeroing is not masking: a loss that sums over every position
//! must still restrict itself to the rolled lengths.

use crate::error::{BatchError, Result};
use ndarray::{concatenate, s, Array3, Axis};

/// Build shifted targets for a stacked `(time, sequences, dims)` array.
///
/// Returns the (partially zeroed) input together with the targets. Both have
/// the shape of `data`.
///
/// # Errors
///
/// [`BatchError::ShapeMismatch`] if `unrolled_lengths` does not have one entry
/// per sequence.
///
/// # Example
///
/// ```
/// use ndarray::Array3;
/// use pianoroll_batcher::batching::shift_targets;
///
/// let data = Array3::from_shape_fn((4, 1, 1), |(t, _, _)| t as f64 + 1.0);
/// let (data, targets) = shift_targets(data, &[2]).unwrap();
///
/// assert_eq!(targets.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 0.0, 0.0]);
/// assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 0.0, 0.0]);
/// ```
pub fn shift_targets(
    mut data: Array3<f64>,
    unrolled_lengths: &[usize],
) -> Result<(Array3<f64>, Array3<f64>)> {
    let (steps, n_sequences, _) = data.dim();

    if unrolled_lengths.len() != n_sequences {
        return Err(BatchError::shape(format!(
            "{} unrolled lengths for {} sequences",
            unrolled_lengths.len(),
            n_sequences
        )));
    }

    if steps == 0 {
        let targets = data.clone();
        return Ok((data, targets));
    }

    // Circular shift by -1; the wrapped first row lands at the end and is
    // overwritten by the zeroing below for every sequence.
    let mut targets = concatenate(
        Axis(0),
        &[data.slice(s![1.., .., ..]), data.slice(s![..1, .., ..])],
    )
    .map_err(|e| BatchError::shape(format!("failed to roll targets: {e}")))?;

    for (seq_idx, &length) in unrolled_lengths.iter().enumerate() {
        let start = length.min(steps);
        targets.slice_mut(s![start.., seq_idx, ..]).fill(0.0);
        data.slice_mut(s![start.., seq_idx, ..]).fill(0.0);
    }

    debug_assert_eq!(targets.dim(), data.dim());

    Ok((data, targets))
}
