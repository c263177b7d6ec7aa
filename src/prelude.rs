//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```ignore
//! use pianoroll_batcher::prelude::*;
//!
//! let loader = npy_directory_loader("data/jsb_chorales").with_threads(4);
//! let dataset = DatasetAssembler::new(BatchingConfig::new(128, 10)).assemble(&loader)?;
//! ```
//!
//! # What's Included
//!
//! ## Configuration
//! - [`DatasetConfig`] - Complete TOML/JSON configuration
//! - [`BatchingConfig`] - Chunk length, chunk cap, sampling
//!
//! ## Loading and Assembly
//! - [`SequenceSource`] - Split-wise sequence provider
//! - [`DirectoryLoader`] / [`npy_directory_loader`] - Directory-backed source
//! - [`PrebuiltDataset`] - In-memory / JSON source
//! - [`DatasetAssembler`], [`Dataset`], [`SplitData`], [`Split`]
//!
//! ## Training Support
//! - [`RecurrentModel`], [`run_epoch`], [`EpochOptions`]
//! - [`accuracy`], [`AccuracyConfig`]
//!
//! ## Export and Validation
//! - [`DatasetExporter`], [`validate_split`]

// ============================================================================
// Configuration
// ============================================================================

pub use crate::config::{BatchingConfig, DatasetConfig, ProcessingConfig};

// ============================================================================
// Loading and Assembly
// ============================================================================

pub use crate::batching::{batch_sequences, BatchedSequences};
pub use crate::dataset::{Dataset, DatasetAssembler, Split, SplitData};
pub use crate::loader::{
    npy_directory_loader, DirectoryLoader, ErrorMode, PrebuiltDataset, SequenceMetadata,
    SequenceSource,
};

// ============================================================================
// Training Support
// ============================================================================

pub use crate::accuracy::{accuracy, AccuracyConfig, AccuracyMethod};
pub use crate::epoch::{run_epoch, ChunkInput, EpochOptions, EpochOutput, RecurrentModel, StepOutput};

// ============================================================================
// Export and Validation
// ============================================================================

pub use crate::export::DatasetExporter;
pub use crate::validation::{validate_split, SequenceValidator, ValidationResult};

// ============================================================================
// Errors
// ============================================================================

pub use crate::error::{BatchError, Result};
