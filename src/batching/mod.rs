//! Sequence batching for truncated backpropagation-through-time.
//!
//! Turns an irregular set of `(length, dims)` sequences into a fixed number of
//! rectangular `(time_batch_len, num_sequences, dims)` chunks, together with
//! next-step targets and the per-chunk valid lengths a loss must respect.
//!
//! # Architecture
//!
//! - **batch_sequences**: pad, stack, shift and split into chunks
//! - **shift_targets**: one-step temporal shift with zeroing past each sequence end
//! - **BatchedSequences**: output structure (chunks, targets, lengths)
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use pianoroll_batcher::batching::batch_sequences;
//!
//! let rolls = vec![Array2::<f64>::zeros((100, 88)), Array2::<f64>::zeros((60, 88))];
//! let batched = batch_sequences(&rolls, Some(32), None).unwrap();
//!
//! assert_eq!(batched.num_time_batches(), 4);
//! assert_eq!(batched.batches[0].dim(), (32, 2, 88));
//! assert_eq!(batched.rolled_lengths[3], vec![3, 0]);
//! ```

mod batcher;
mod targets;

pub use batcher::{batch_sequences, rolled_length, BatchedSequences};
pub use targets::shift_targets;
