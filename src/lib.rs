//! Piano-Roll Batcher
//!
//! Chunked sequence batching for training recurrent models on polyphonic
//! piano-roll data with truncated backpropagation-through-time.
//!
//! # Overview
//!
//! Variable-length `(length, dims)` sequences are zero-padded to a common
//! length, shifted by one step to form next-step targets, and split into
//! fixed-length time chunks. Every chunk carries the per-sequence count of
//! valid steps so that padding never contaminates loss or accuracy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Piano-Roll Batcher                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  loader/     - Sequence sources (npy directories, JSON)         │
//! │  batching/   - Padding, target shifting, chunking               │
//! │  dataset/    - Train/test/valid assembly                        │
//! │  epoch/      - Stateful pass of a model over the chunks         │
//! │  accuracy/   - Sampled frame-level accuracy                     │
//! │  validation/ - Sequence and split checks                        │
//! │  export/     - NumPy export for Python/PyTorch                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pianoroll_batcher::prelude::*;
//!
//! let config = DatasetConfig::load_toml("configs/nottingham.toml")?;
//! let loader = npy_directory_loader(&config.data.input_dir);
//! let dataset = DatasetAssembler::new(config.batching.clone()).assemble(&loader)?;
//!
//! let train = run_epoch(&mut model, &dataset.train, EpochOptions::training())?;
//! println!("train loss {:.4}", train.mean_loss());
//! ```

pub mod accuracy;
pub mod batching;
pub mod config;
pub mod dataset;
pub mod epoch;
pub mod error;
pub mod export;
pub mod loader;
pub mod prelude;
pub mod validation;

// Re-exports - Errors
pub use error::{BatchError, Result};

// Re-exports - Config
pub use config::{BatchingConfig, DataPathConfig, DatasetConfig, ExperimentInfo, ProcessingConfig};

// Re-exports - Batching
pub use batching::{batch_sequences, rolled_length, shift_targets, BatchedSequences};

// Re-exports - Loading
pub use loader::{
    npy_directory_loader, read_npy_sequence, DirectoryLoader, ErrorMode, PrebuiltDataset,
    SequenceMetadata, SequenceRecord, SequenceSource,
};

// Re-exports - Dataset
pub use dataset::{Dataset, DatasetAssembler, Split, SplitData};

// Re-exports - Epoch
pub use epoch::{run_epoch, ChunkInput, EpochOptions, EpochOutput, RecurrentModel, StepOutput};

// Re-exports - Accuracy
pub use accuracy::{accuracy, accuracy_counts, AccuracyConfig, AccuracyCounts, AccuracyMethod};

// Re-exports - Validation
pub use validation::{
    validate_split, SequenceValidator, ValidationConfig, ValidationLevel, ValidationResult,
};

// Re-exports - Export
pub use export::{read_split, read_summary, DatasetExporter, DatasetSummary, SplitMetadata};
