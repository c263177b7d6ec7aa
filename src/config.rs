//! Dataset configuration management.
//!
//! Configuration-driven batching: every parameter that shapes the chunked
//! dataset lives in one serializable struct so experiments are reproducible.
//!
//! # Features
//!
//! - **Unified Configuration**: paths, batching, processing in one struct
//! - **Serialization**: save/load to TOML or JSON
//! - **Validation**: configurations are checked before use
//!
//! # Sample TOML
//!
//! ```toml
//! [experiment]
//! name = "nottingham_tbptt"
//!
//! [data]
//! input_dir = "data/nottingham"
//! output_dir = "data/exports/nottingham"
//!
//! [batching]
//! time_step = 120.0
//! time_batch_len = 128
//! max_time_batches = 10
//! num_samples = 20
//!
//! [processing]
//! threads = 4
//! error_mode = "fail_fast"
//! file_extension = "npy"
//! ```
//!
//! `time_batch_len = -1` batches with the longest sequence length and
//! `max_time_batches = -1` disables the chunk cap.

use crate::error::{BatchError, Result};
use crate::loader::ErrorMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Experiment Metadata
// ============================================================================

/// Experiment metadata carried along for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentInfo {
    /// Experiment name
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Config version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for ExperimentInfo {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            description: String::new(),
            version: default_version(),
        }
    }
}

// ============================================================================
// Data Paths
// ============================================================================

/// Input and output locations.
///
/// `input_dir` contains one sub-directory per split (`train/`, `test/`,
/// `valid/`), each holding one file per sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPathConfig {
    /// Root directory with the split sub-directories
    pub input_dir: PathBuf,

    /// Where exports are written
    pub output_dir: PathBuf,
}

impl DataPathConfig {
    /// Create a new path configuration.
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(input_dir: P1, output_dir: P2) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Validate that the input directory exists.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.input_dir.exists() {
            return Err(format!(
                "input_dir does not exist: {}",
                self.input_dir.display()
            ));
        }
        self.validate_lenient()
    }

    /// Validate without touching the filesystem.
    pub fn validate_lenient(&self) -> std::result::Result<(), String> {
        if self.input_dir.as_os_str().is_empty() {
            return Err("input_dir cannot be empty".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err("output_dir cannot be empty".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Batching
// ============================================================================

/// Batching and evaluation parameters.
///
/// Signed fields follow the `-1` convention of the file format; use the
/// accessor methods to get the `Option<usize>` form the batcher takes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Time discretization handed to the sequence parser
    #[serde(default = "default_time_step")]
    pub time_step: f64,

    /// Chunk duration in steps, `-1` for the longest sequence
    #[serde(default = "default_time_batch_len")]
    pub time_batch_len: i64,

    /// Maximum number of chunks, `-1` for unbounded (never applied to test)
    #[serde(default = "default_max_time_batches")]
    pub max_time_batches: i64,

    /// Expected number of sequences in an evaluated batch, if fixed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Bernoulli draws per (step, channel) in the accuracy metric
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
}

fn default_time_step() -> f64 {
    120.0
}

fn default_time_batch_len() -> i64 {
    -1
}

fn default_max_time_batches() -> i64 {
    -1
}

fn default_num_samples() -> usize {
    20
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            time_step: default_time_step(),
            time_batch_len: default_time_batch_len(),
            max_time_batches: default_max_time_batches(),
            batch_size: None,
            num_samples: default_num_samples(),
        }
    }
}

impl BatchingConfig {
    /// Create a batching configuration with explicit chunk parameters.
    ///
    /// Negative values mean "unset", as in the TOML form.
    pub fn new(time_batch_len: i64, max_time_batches: i64) -> Self {
        Self {
            time_batch_len,
            max_time_batches,
            ..Self::default()
        }
    }

    /// Set the parser time step.
    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Set the number of accuracy samples.
    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    /// Chunk duration, `None` when the longest sequence should be used.
    pub fn time_batch_len(&self) -> Option<usize> {
        usize::try_from(self.time_batch_len).ok()
    }

    /// Chunk cap, `None` when unbounded.
    pub fn max_time_batches(&self) -> Option<usize> {
        usize::try_from(self.max_time_batches).ok()
    }

    /// Validate batching parameters.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(format!("time_step must be > 0, got {}", self.time_step));
        }
        if self.time_batch_len == 0 {
            return Err("time_batch_len must be > 0 or -1".to_string());
        }
        if self.batch_size == Some(0) {
            return Err("batch_size must be > 0".to_string());
        }
        if self.num_samples == 0 {
            return Err("num_samples must be > 0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Processing
// ============================================================================

/// Parallelism and error handling for directory loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of threads for file parsing; Rayon's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    /// What to do when a file fails to parse
    #[serde(default)]
    pub error_mode: ErrorMode,

    /// Only files with this extension are loaded (without the dot)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            threads: None,
            error_mode: ErrorMode::FailFast,
            file_extension: Some("npy".to_string()),
        }
    }
}

impl ProcessingConfig {
    /// Validate the processing configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.threads == Some(0) {
            return Err("threads must be > 0".to_string());
        }
        if let Some(ext) = &self.file_extension {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(format!(
                    "file_extension must be non-empty and given without a dot, got '{ext}'"
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Dataset Configuration
// ============================================================================

/// Complete configuration for building a chunked dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Experiment metadata
    #[serde(default)]
    pub experiment: ExperimentInfo,

    /// Data paths
    pub data: DataPathConfig,

    /// Batching parameters
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl DatasetConfig {
    /// Create a configuration with default batching and processing.
    pub fn new(data: DataPathConfig) -> Self {
        Self {
            experiment: ExperimentInfo::default(),
            data,
            batching: BatchingConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }

    /// Set experiment metadata.
    pub fn with_experiment(mut self, experiment: ExperimentInfo) -> Self {
        self.experiment = experiment;
        self
    }

    /// Set batching parameters.
    pub fn with_batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = batching;
        self
    }

    /// Set processing configuration.
    pub fn with_processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    /// Validate every section without requiring paths to exist.
    pub fn validate(&self) -> Result<()> {
        self.data
            .validate_lenient()
            .map_err(|e| BatchError::config(format!("data: {e}")))?;
        self.batching
            .validate()
            .map_err(|e| BatchError::config(format!("batching: {e}")))?;
        self.processing
            .validate()
            .map_err(|e| BatchError::config(format!("processing: {e}")))?;
        Ok(())
    }

    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: DatasetConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: DatasetConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path, json_string)?;
        Ok(())
    }
}
