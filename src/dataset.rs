//! Dataset assembly across train/test/valid splits.
//!
//! Each split is loaded from a [`SequenceSource`], batched with its own chunk
//! cap and stored as an immutable [`SplitData`]. The test split is never
//! capped so that evaluation data is not silently dropped.
//!
//! # Output Structure
//!
//! | Field | Type | Description |
//! |-------|------|-------------|
//! | `batches` | `Vec<Array3<f64>>` | Input chunks `(time_batch_len, N, dims)` |
//! | `targets` | `Vec<Array3<f64>>` | Next-step targets, same shapes |
//! | `rolled_lengths` | `Vec<Vec<usize>>` | Valid steps per `[chunk][sequence]` |
//! | `unrolled_lengths` | `Vec<usize>` | `length - 1` per sequence |
//! | `metadata` | `Vec<SequenceMetadata>` | Identity of each surviving sequence |
//!
//! Splits are independent, so they are batched in parallel. A built
//! [`Dataset`] is read-only and can be shared across threads.

use crate::batching::{batch_sequences, BatchedSequences};
use crate::config::BatchingConfig;
use crate::error::{BatchError, Result};
use crate::loader::{SequenceMetadata, SequenceSource};
use crate::validation::SequenceValidator;
use ndarray::{Array2, Array3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
    Valid,
}

impl Split {
    /// All splits in assembly order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Test, Split::Valid];

    /// Directory / key name of the split.
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
            Split::Valid => "valid",
        }
    }

    /// Chunk cap to apply to this split. The test split is always unbounded.
    pub fn max_time_batches(&self, configured: Option<usize>) -> Option<usize> {
        match self {
            Split::Test => None,
            Split::Train | Split::Valid => configured,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One batched split.
///
/// Invariant: `batches`, `targets` and `rolled_lengths` all have
/// `num_time_batches()` entries, `batches[t].dim() == targets[t].dim()`, and
/// `metadata` / `unrolled_lengths` have one entry per sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitData {
    pub batches: Vec<Array3<f64>>,
    pub targets: Vec<Array3<f64>>,
    pub rolled_lengths: Vec<Vec<usize>>,
    pub unrolled_lengths: Vec<usize>,
    pub metadata: Vec<SequenceMetadata>,
    pub time_batch_len: usize,
}

impl SplitData {
    /// Build from batcher output, keeping only the metadata of survivors.
    pub fn from_batched(batched: BatchedSequences, metadata: &[SequenceMetadata]) -> Result<Self> {
        let metadata = batched
            .kept_indices
            .iter()
            .map(|&idx| {
                metadata.get(idx).cloned().ok_or_else(|| {
                    BatchError::shape(format!(
                        "no metadata for sequence {idx} ({} records)",
                        metadata.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            batches: batched.batches,
            targets: batched.targets,
            rolled_lengths: batched.rolled_lengths,
            unrolled_lengths: batched.unrolled_lengths,
            metadata,
            time_batch_len: batched.time_batch_len,
        })
    }

    /// Wrap a single chunk so it can be run like any chunked split.
    pub fn single_chunk(
        batch: Array3<f64>,
        targets: Array3<f64>,
        rolled_lengths: Vec<usize>,
        unrolled_lengths: Vec<usize>,
        metadata: Vec<SequenceMetadata>,
    ) -> Result<Self> {
        if batch.dim() != targets.dim() {
            return Err(BatchError::shape(format!(
                "batch {:?} and targets {:?} differ",
                batch.dim(),
                targets.dim()
            )));
        }
        let time_batch_len = batch.dim().0;
        Ok(Self {
            batches: vec![batch],
            targets: vec![targets],
            rolled_lengths: vec![rolled_lengths],
            unrolled_lengths,
            metadata,
            time_batch_len,
        })
    }

    /// Number of chunks.
    pub fn num_time_batches(&self) -> usize {
        self.batches.len()
    }

    /// Number of sequences.
    pub fn num_sequences(&self) -> usize {
        self.unrolled_lengths.len()
    }

    /// Channel count, 0 when there are no chunks.
    pub fn input_dim(&self) -> usize {
        self.batches.first().map(|b| b.dim().2).unwrap_or(0)
    }
}

/// All three batched splits plus the shared channel count.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: SplitData,
    pub test: SplitData,
    pub valid: SplitData,
    pub input_dim: usize,
}

impl Dataset {
    /// Access a split by key.
    pub fn split(&self, split: Split) -> &SplitData {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
            Split::Valid => &self.valid,
        }
    }
}

/// Applies loading and batching to every split.
///
/// # Example
///
/// ```ignore
/// use pianoroll_batcher::{BatchingConfig, DatasetAssembler};
/// use pianoroll_batcher::loader::npy_directory_loader;
///
/// let assembler = DatasetAssembler::new(BatchingConfig::new(128, 10));
/// let dataset = assembler.assemble(&npy_directory_loader("data/nottingham"))?;
/// println!("input_dim = {}", dataset.input_dim);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatasetAssembler {
    config: BatchingConfig,
    validator: Option<SequenceValidator>,
}

impl DatasetAssembler {
    /// Create an assembler with the given batching parameters.
    pub fn new(config: BatchingConfig) -> Self {
        Self {
            config,
            validator: None,
        }
    }

    /// Check raw sequences before batching. Errors fail the split, warnings are logged.
    pub fn with_sequence_validator(mut self, validator: SequenceValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Batching parameters in use.
    pub fn config(&self) -> &BatchingConfig {
        &self.config
    }

    /// Load and batch one split.
    pub fn assemble_split<S: SequenceSource + ?Sized>(
        &self,
        source: &S,
        split: Split,
    ) -> Result<SplitData> {
        let records = source.load_split(split)?;
        let (sequences, metadata): (Vec<Array2<f64>>, Vec<SequenceMetadata>) = records
            .into_iter()
            .map(|r| (r.sequence, r.metadata))
            .unzip();

        if let Some(validator) = &self.validator {
            check_sequences(validator, split, &sequences)?;
        }

        let max_time_batches = split.max_time_batches(self.config.max_time_batches());
        log::info!(
            "Batching {} split: {} sequences, time_batch_len={:?}, max_time_batches={:?}",
            split,
            sequences.len(),
            self.config.time_batch_len(),
            max_time_batches
        );

        let batched = batch_sequences(&sequences, self.config.time_batch_len(), max_time_batches)
            .map_err(|e| match e {
                BatchError::EmptyInput(msg) => BatchError::EmptyInput(format!("{split}: {msg}")),
                BatchError::ShapeMismatch(msg) => {
                    BatchError::ShapeMismatch(format!("{split}: {msg}"))
                }
                other => other,
            })?;

        SplitData::from_batched(batched, &metadata)
    }

    /// Load and batch train, test and valid, in parallel.
    ///
    /// # Errors
    ///
    /// Any loading or batching error of any split, or
    /// [`BatchError::ShapeMismatch`] when the splits disagree on `input_dim`.
    pub fn assemble<S: SequenceSource + Sync + ?Sized>(&self, source: &S) -> Result<Dataset> {
        let mut splits = Split::ALL
            .par_iter()
            .map(|&split| self.assemble_split(source, split).map(|data| (split, data)))
            .collect::<Result<Vec<_>>>()?;

        let input_dim = splits
            .first()
            .map(|(_, data)| data.input_dim())
            .unwrap_or(0);
        if let Some((split, data)) = splits.iter().find(|(_, d)| d.input_dim() != input_dim) {
            return Err(BatchError::shape(format!(
                "{} split has input_dim {}, expected {}",
                split,
                data.input_dim(),
                input_dim
            )));
        }

        // par_iter().collect() preserves Split::ALL order
        let valid = take_split(&mut splits, Split::Valid)?;
        let test = take_split(&mut splits, Split::Test)?;
        let train = take_split(&mut splits, Split::Train)?;

        log::info!(
            "Assembled dataset: input_dim={}, train={}x{}, test={}x{}, valid={}x{} (sequences x chunks)",
            input_dim,
            train.num_sequences(),
            train.num_time_batches(),
            test.num_sequences(),
            test.num_time_batches(),
            valid.num_sequences(),
            valid.num_time_batches()
        );

        Ok(Dataset {
            train,
            test,
            valid,
            input_dim,
        })
    }
}

fn check_sequences(validator: &SequenceValidator, split: Split, sequences: &[Array2<f64>]) -> Result<()> {
    let result = validator.validate_sequences(sequences);
    for warning in result.warnings() {
        log::warn!("{split}: {warning}");
    }

    let errors = result.errors();
    match errors.first() {
        None => Ok(()),
        Some(first) => Err(BatchError::Validation(format!(
            "{split}: {} failed checks, first: {first}",
            errors.len()
        ))),
    }
}

fn take_split(splits: &mut Vec<(Split, SplitData)>, split: Split) -> Result<SplitData> {
    let pos = splits
        .iter()
        .position(|(s, _)| *s == split)
        .ok_or_else(|| BatchError::empty(format!("{split} split missing")))?;
    Ok(splits.swap_remove(pos).1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PrebuiltDataset;
    use ndarray::Array2;

    fn rolls(lengths: &[usize], dims: usize) -> (Vec<Array2<f64>>, Vec<SequenceMetadata>) {
        let sequences = lengths
            .iter()
            .map(|&len| Array2::from_elem((len, dims), 1.0))
            .collect();
        let metadata = (0..lengths.len())
            .map(|i| SequenceMetadata::named(format!("tune_{i}")))
            .collect();
        (sequences, metadata)
    }

    fn prebuilt(train: &[usize], test: &[usize], valid: &[usize], dims: usize) -> PrebuiltDataset {
        let (tr, trm) = rolls(train, dims);
        let (te, tem) = rolls(test, dims);
        let (va, vam) = rolls(valid, dims);
        PrebuiltDataset::new()
            .with_split(Split::Train, tr, trm)
            .with_split(Split::Test, te, tem)
            .with_split(Split::Valid, va, vam)
    }

    #[test]
    fn test_split_names() {
        assert_eq!(Split::Train.to_string(), "train");
        assert_eq!(Split::Valid.as_str(), "valid");
        assert_eq!(Split::Test.max_time_batches(Some(3)), None);
        assert_eq!(Split::Train.max_time_batches(Some(3)), Some(3));
    }

    #[test]
    fn test_assemble_test_split_uncapped() {
        // time_batch_len 4, cap 2 -> max_len 8 for train/valid only
        let source = prebuilt(&[5, 12], &[5, 12], &[8, 9], 3);
        let dataset = DatasetAssembler::new(BatchingConfig::new(4, 2))
            .assemble(&source)
            .unwrap();

        assert_eq!(dataset.input_dim, 3);
        assert_eq!(dataset.train.num_sequences(), 1);
        assert_eq!(dataset.train.metadata[0].name, "tune_0");
        assert_eq!(dataset.test.num_sequences(), 2);
        assert_eq!(dataset.test.num_time_batches(), 3);
        assert_eq!(dataset.valid.num_sequences(), 1);
        assert_eq!(dataset.valid.unrolled_lengths, vec![7]);
    }

    #[test]
    fn test_metadata_follows_survivors() {
        let source = prebuilt(&[20, 3, 30, 4], &[2], &[2], 1);
        let dataset = DatasetAssembler::new(BatchingConfig::new(5, 1))
            .assemble(&source)
            .unwrap();
        let names: Vec<&str> = dataset
            .train
            .metadata
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["tune_1", "tune_3"]);
    }

    #[test]
    fn test_input_dim_disagreement() {
        let (tr, trm) = rolls(&[3], 4);
        let (te, tem) = rolls(&[3], 5);
        let (va, vam) = rolls(&[3], 4);
        let source = PrebuiltDataset::new()
            .with_split(Split::Train, tr, trm)
            .with_split(Split::Test, te, tem)
            .with_split(Split::Valid, va, vam);

        let result = DatasetAssembler::default().assemble(&source);
        assert!(matches!(result, Err(BatchError::ShapeMismatch(_))));
    }

    #[test]
    fn test_empty_split_fails() {
        let source = prebuilt(&[3], &[], &[3], 2);
        let result = DatasetAssembler::default().assemble(&source);
        match result {
            Err(BatchError::EmptyInput(msg)) => assert!(msg.starts_with("test")),
            other => panic!("expected EmptyInput, got {other:?}"),
        }
    }

    #[test]
    fn test_sequence_validator_rejects_nan() {
        let (mut tr, trm) = rolls(&[4, 6], 2);
        tr[1][[3, 0]] = f64::NAN;
        let (te, tem) = rolls(&[3], 2);
        let (va, vam) = rolls(&[3], 2);
        let source = PrebuiltDataset::new()
            .with_split(Split::Train, tr, trm)
            .with_split(Split::Test, te, tem)
            .with_split(Split::Valid, va, vam);

        let checked = DatasetAssembler::new(BatchingConfig::new(2, -1))
            .with_sequence_validator(SequenceValidator::new());
        match checked.assemble(&source) {
            Err(BatchError::Validation(msg)) => {
                assert!(msg.starts_with("train"), "{msg}");
                assert!(msg.contains("sequence_1/nan_inf_check"), "{msg}");
            }
            other => panic!("expected Validation, got {other:?}"),
        }

        // without a validator the NaN is batched as-is
        assert!(DatasetAssembler::new(BatchingConfig::new(2, -1))
            .assemble(&source)
            .is_ok());
    }

    #[test]
    fn test_sequence_validator_passes_clean_rolls() {
        let source = prebuilt(&[4, 6], &[3], &[5], 2);
        let dataset = DatasetAssembler::new(BatchingConfig::new(2, -1))
            .with_sequence_validator(SequenceValidator::new())
            .assemble(&source)
            .unwrap();
        assert_eq!(dataset.train.num_sequences(), 2);
    }

    #[test]
    fn test_single_chunk_wrapping() {
        let batch = Array3::<f64>::zeros((4, 2, 3));
        let split = SplitData::single_chunk(
            batch.clone(),
            batch,
            vec![3, 1],
            vec![3, 1],
            vec![SequenceMetadata::named("a"), SequenceMetadata::named("b")],
        )
        .unwrap();
        assert_eq!(split.num_time_batches(), 1);
        assert_eq!(split.time_batch_len, 4);
        assert_eq!(split.input_dim(), 3);

        let bad = SplitData::single_chunk(
            Array3::zeros((4, 2, 3)),
            Array3::zeros((4, 2, 2)),
            vec![0, 0],
            vec![0, 0],
            vec![],
        );
        assert!(bad.is_err());
    }
}
