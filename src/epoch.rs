//! Running a recurrent model over the chunks of one split.
//!
//! Chunks are processed strictly in order: the state returned for chunk `t`
//! is the state fed to chunk `t + 1`. The loop is a plain fold, so models that
//! only expose a synchronous step compose directly. State is reinitialized at
//! the start of every call; nothing carries over between epochs or splits.
//!
//! # Example
//!
//! ```ignore
//! use pianoroll_batcher::epoch::{run_epoch, EpochOptions};
//!
//! for epoch in 0..num_epochs {
//!     let train = run_epoch(&mut model, &dataset.train, EpochOptions::training())?;
//!     let valid = run_epoch(&mut model, &dataset.valid, EpochOptions::evaluation())?;
//!     log::info!("epoch {epoch}: train {:.4} valid {:.4}", train.loss, valid.loss);
//! }
//! ```

use crate::dataset::SplitData;
use crate::error::{BatchError, Result};
use ndarray::{Array3, ArrayView3};

/// Everything the model sees for one chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkInput<'a> {
    /// Chunk index within the split
    pub index: usize,

    /// `(time_batch_len, N, dims)` input frames
    pub inputs: ArrayView3<'a, f64>,

    /// Next-step targets, same shape as `inputs`
    pub targets: ArrayView3<'a, f64>,

    /// Valid steps of each sequence inside this chunk
    pub rolled_lengths: &'a [usize],

    /// `length - 1` of each sequence, for the whole split
    pub unrolled_lengths: &'a [usize],
}

/// What a model step returns.
#[derive(Debug, Clone)]
pub struct StepOutput<S> {
    /// Loss of this chunk
    pub loss: f64,

    /// State to feed into the next chunk
    pub state: S,

    /// Per-step output probabilities, `(time_batch_len, N, dims)`
    pub probabilities: Option<Array3<f64>>,
}

/// A trainable recurrent unit, seen from the batching side.
///
/// The loss a model computes must be restricted to `rolled_lengths`: padded
/// steps hold zeroed inputs and zeroed targets, which would otherwise be
/// scored as genuine "all notes off" predictions.
pub trait RecurrentModel {
    /// Recurrent state threaded between chunks.
    type State;

    /// State at the start of a split.
    fn initial_state(&self) -> Self::State;

    /// Forward one chunk. `want_probabilities` asks the model to include its
    /// output probabilities in the result.
    fn step(
        &mut self,
        state: Self::State,
        chunk: ChunkInput<'_>,
        want_probabilities: bool,
    ) -> Result<StepOutput<Self::State>>;

    /// Parameter update after a training step. No-op by default.
    fn apply_update(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Options for one pass over a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochOptions {
    /// Call [`RecurrentModel::apply_update`] after every chunk
    pub training: bool,

    /// Gather per-chunk probability arrays
    pub collect_probabilities: bool,
}

impl EpochOptions {
    /// Training pass.
    pub fn training() -> Self {
        Self {
            training: true,
            collect_probabilities: false,
        }
    }

    /// Loss-only evaluation pass.
    pub fn evaluation() -> Self {
        Self::default()
    }

    /// Evaluation pass that also returns probabilities (for accuracy).
    pub fn testing() -> Self {
        Self {
            training: false,
            collect_probabilities: true,
        }
    }
}

/// Result of one pass over a split.
#[derive(Debug, Clone)]
pub struct EpochOutput {
    /// Sum of chunk losses
    pub loss: f64,

    /// Per-chunk probabilities when requested
    pub probabilities: Option<Vec<Array3<f64>>>,

    /// Chunks processed
    pub chunks: usize,
}

impl EpochOutput {
    /// Average loss per chunk (0 when no chunk ran).
    pub fn mean_loss(&self) -> f64 {
        if self.chunks == 0 {
            0.0
        } else {
            self.loss / self.chunks as f64
        }
    }
}

/// Run `model` over every chunk of `split`, in order.
///
/// # Errors
///
/// - [`BatchError::ShapeMismatch`] if the split's per-chunk vectors disagree
///   in length or a batch and its targets differ in shape
/// - [`BatchError::Model`] if probabilities were requested but a step
///   returned none
/// - any error returned by the model itself
pub fn run_epoch<M: RecurrentModel + ?Sized>(
    model: &mut M,
    split: &SplitData,
    options: EpochOptions,
) -> Result<EpochOutput> {
    check_alignment(split)?;

    let mut state = model.initial_state();
    let mut loss = 0.0;
    let mut probabilities = options
        .collect_probabilities
        .then(|| Vec::with_capacity(split.num_time_batches()));

    for t in 0..split.num_time_batches() {
        let chunk = ChunkInput {
            index: t,
            inputs: split.batches[t].view(),
            targets: split.targets[t].view(),
            rolled_lengths: &split.rolled_lengths[t],
            unrolled_lengths: &split.unrolled_lengths,
        };

        let output = model.step(state, chunk, options.collect_probabilities)?;

        if options.training {
            model.apply_update()?;
        }

        log::debug!("chunk {}/{}: loss {:.6}", t + 1, split.num_time_batches(), output.loss);
        loss += output.loss;
        state = output.state;

        if let Some(collected) = probabilities.as_mut() {
            let probs = output.probabilities.ok_or_else(|| {
                BatchError::Model(format!("chunk {t}: probabilities requested but not returned"))
            })?;
            collected.push(probs);
        }
    }

    Ok(EpochOutput {
        loss,
        probabilities,
        chunks: split.num_time_batches(),
    })
}

fn check_alignment(split: &SplitData) -> Result<()> {
    let n = split.batches.len();
    if split.targets.len() != n || split.rolled_lengths.len() != n {
        return Err(BatchError::shape(format!(
            "{} batches, {} targets, {} rolled-length arrays",
            n,
            split.targets.len(),
            split.rolled_lengths.len()
        )));
    }
    for (t, (batch, target)) in split.batches.iter().zip(&split.targets).enumerate() {
        if batch.dim() != target.dim() {
            return Err(BatchError::shape(format!(
                "chunk {}: batch {:?} vs targets {:?}",
                t,
                batch.dim(),
                target.dim()
            )));
        }
    }
    Ok(())
}
