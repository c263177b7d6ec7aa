//! Data Export Module
//!
//! Writes a batched [`Dataset`] to NumPy files so that a Python/PyTorch
//! training loop can consume the exact chunks, targets and lengths produced
//! here, and reads them back.
//!
//! # Output Layout
//!
//! ```text
//! output_dir/
//! ├── train_inputs.npy            (T_chunks, L, N, D) f64
//! ├── train_targets.npy           (T_chunks, L, N, D) f64
//! ├── train_rolled_lengths.npy    (T_chunks, N)       i64
//! ├── train_unrolled_lengths.npy  (N,)                i64
//! ├── train_metadata.json
//! ├── test_*  / valid_*           same layout
//! └── dataset_summary.json
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pianoroll_batcher::export::{read_split, DatasetExporter};
//!
//! let exporter = DatasetExporter::new("out/nottingham").with_config(config.batching.clone());
//! let summary = exporter.export(&dataset)?;
//! println!("exported {} splits", summary.splits.len());
//!
//! let train = read_split("out/nottingham", Split::Train)?;
//! ```

use crate::config::BatchingConfig;
use crate::dataset::{Dataset, Split, SplitData};
use crate::error::{BatchError, Result};
use crate::loader::SequenceMetadata;
use ndarray::{stack, Array1, Array2, Array3, Array4, ArrayView3, Axis};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Name of the top-level summary file.
pub const SUMMARY_FILE: &str = "dataset_summary.json";

/// Per-split metadata written next to the arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitMetadata {
    pub split: Split,
    pub num_sequences: usize,
    pub num_time_batches: usize,
    pub time_batch_len: usize,
    pub input_dim: usize,

    /// Valid (non-padded) steps summed over all sequences
    pub total_unrolled_steps: usize,

    /// One record per sequence, in batch order
    pub sequences: Vec<SequenceMetadata>,
}

impl SplitMetadata {
    pub fn from_split(split: Split, data: &SplitData) -> Self {
        Self {
            split,
            num_sequences: data.num_sequences(),
            num_time_batches: data.num_time_batches(),
            time_batch_len: data.time_batch_len,
            input_dim: data.input_dim(),
            total_unrolled_steps: data.unrolled_lengths.iter().sum(),
            sequences: data.metadata.clone(),
        }
    }
}

/// Dataset-level summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub input_dim: usize,

    /// Batching parameters the dataset was built with, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batching: Option<BatchingConfig>,

    pub splits: Vec<SplitMetadata>,
}

/// NumPy exporter for batched datasets.
#[derive(Debug, Clone)]
pub struct DatasetExporter {
    output_dir: PathBuf,
    batching: Option<BatchingConfig>,
}

impl DatasetExporter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            batching: None,
        }
    }

    /// Record the batching parameters in the summary.
    pub fn with_config(mut self, batching: BatchingConfig) -> Self {
        self.batching = Some(batching);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Export every split plus `dataset_summary.json`.
    pub fn export(&self, dataset: &Dataset) -> Result<DatasetSummary> {
        fs::create_dir_all(&self.output_dir)?;

        let splits = Split::ALL
            .iter()
            .map(|&split| self.export_split(split, dataset.split(split)))
            .collect::<Result<Vec<_>>>()?;

        let summary = DatasetSummary {
            input_dim: dataset.input_dim,
            batching: self.batching.clone(),
            splits,
        };

        let path = self.output_dir.join(SUMMARY_FILE);
        serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &summary)?;
        log::info!("Exported summary: {}", path.display());

        Ok(summary)
    }

    /// Export one split's arrays and metadata.
    pub fn export_split(&self, split: Split, data: &SplitData) -> Result<SplitMetadata> {
        fs::create_dir_all(&self.output_dir)?;
        let metadata = SplitMetadata::from_split(split, data);
        let (l, n, d) = (data.time_batch_len, data.num_sequences(), data.input_dim());

        let inputs = stack_chunks(&data.batches, (l, n, d))?;
        let targets = stack_chunks(&data.targets, (l, n, d))?;
        let rolled = rolled_array(&data.rolled_lengths, n)?;
        let unrolled: Array1<i64> = data.unrolled_lengths.iter().map(|&u| to_i64(u)).collect::<Result<_>>()?;

        write_array(&self.file(split, "inputs.npy"), &inputs)?;
        write_array(&self.file(split, "targets.npy"), &targets)?;
        write_array(&self.file(split, "rolled_lengths.npy"), &rolled)?;
        write_array(&self.file(split, "unrolled_lengths.npy"), &unrolled)?;

        let path = self.file(split, "metadata.json");
        serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &metadata)?;

        log::info!(
            "Exported {split}: {} chunks x [{} steps x {} sequences x {} dims]",
            metadata.num_time_batches,
            l,
            n,
            d
        );

        Ok(metadata)
    }

    fn file(&self, split: Split, suffix: &str) -> PathBuf {
        split_file(&self.output_dir, split, suffix)
    }
}

fn split_file(dir: &Path, split: Split, suffix: &str) -> PathBuf {
    dir.join(format!("{}_{}", split.as_str(), suffix))
}

fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| BatchError::shape(format!("length {value} overflows i64")))
}

fn stack_chunks(chunks: &[Array3<f64>], shape: (usize, usize, usize)) -> Result<Array4<f64>> {
    if chunks.is_empty() {
        return Ok(Array4::zeros((0, shape.0, shape.1, shape.2)));
    }
    let views: Vec<ArrayView3<'_, f64>> = chunks.iter().map(|c| c.view()).collect();
    stack(Axis(0), &views).map_err(|e| BatchError::shape(format!("failed to stack chunks: {e}")))
}

fn rolled_array(rolled: &[Vec<usize>], n: usize) -> Result<Array2<i64>> {
    let flat = rolled
        .iter()
        .flat_map(|row| row.iter().map(|&v| to_i64(v)))
        .collect::<Result<Vec<_>>>()?;
    Array2::from_shape_vec((rolled.len(), n), flat)
        .map_err(|e| BatchError::shape(format!("ragged rolled lengths: {e}")))
}

fn write_array<A: WriteNpyExt>(path: &Path, array: &A) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    array.write_npy(writer)?;
    Ok(())
}

fn from_i64(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| BatchError::shape(format!("negative length {value}")))
}

/// Read a split previously written by [`DatasetExporter`].
pub fn read_split<P: AsRef<Path>>(dir: P, split: Split) -> Result<SplitData> {
    let dir = dir.as_ref();

    let metadata: SplitMetadata = serde_json::from_reader(BufReader::new(File::open(
        split_file(dir, split, "metadata.json"),
    )?))?;

    let inputs = Array4::<f64>::read_npy(File::open(split_file(dir, split, "inputs.npy"))?)?;
    let targets = Array4::<f64>::read_npy(File::open(split_file(dir, split, "targets.npy"))?)?;
    let rolled = Array2::<i64>::read_npy(File::open(split_file(dir, split, "rolled_lengths.npy"))?)?;
    let unrolled =
        Array1::<i64>::read_npy(File::open(split_file(dir, split, "unrolled_lengths.npy"))?)?;

    if inputs.dim() != targets.dim() {
        return Err(BatchError::shape(format!(
            "{split}: inputs {:?} vs targets {:?}",
            inputs.dim(),
            targets.dim()
        )));
    }
    if inputs.len_of(Axis(0)) != metadata.num_time_batches
        || rolled.nrows() != metadata.num_time_batches
        || unrolled.len() != metadata.num_sequences
    {
        return Err(BatchError::shape(format!(
            "{split}: arrays disagree with metadata ({} chunks, {} sequences)",
            metadata.num_time_batches, metadata.num_sequences
        )));
    }

    let rolled_lengths = rolled
        .outer_iter()
        .map(|row| row.iter().map(|&v| from_i64(v)).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;
    let unrolled_lengths = unrolled.iter().map(|&v| from_i64(v)).collect::<Result<Vec<_>>>()?;

    Ok(SplitData {
        batches: inputs.outer_iter().map(|c| c.to_owned()).collect(),
        targets: targets.outer_iter().map(|c| c.to_owned()).collect(),
        rolled_lengths,
        unrolled_lengths,
        metadata: metadata.sequences,
        time_batch_len: metadata.time_batch_len,
    })
}

/// Read `dataset_summary.json`.
pub fn read_summary<P: AsRef<Path>>(dir: P) -> Result<DatasetSummary> {
    let file = File::open(dir.as_ref().join(SUMMARY_FILE))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
