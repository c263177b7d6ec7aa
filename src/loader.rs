//! Sequence sources for the dataset assembler.
//!
//! A source yields, per split, an ordered list of `(sequence, metadata)`
//! records. Two kinds are provided:
//!
//! - [`DirectoryLoader`]: parses every file of `root/<split>/` with an
//!   injected parse function (e.g. a MIDI → piano-roll decoder). Files are
//!   parsed in parallel on a local Rayon pool; output order is the sorted
//!   file order regardless of scheduling.
//! - [`PrebuiltDataset`]: sequences already decoded and keyed by split name,
//!   with `<split>_metadata` alongside, as JSON.
//!
//! # Example
//!
//! ```ignore
//! use pianoroll_batcher::loader::{DirectoryLoader, SequenceSource};
//! use pianoroll_batcher::Split;
//!
//! let loader = DirectoryLoader::new("data/nottingham", 120.0, parse_midi)
//!     .with_extension("mid")
//!     .with_threads(4);
//! let train = loader.load_split(Split::Train)?;
//! ```

use crate::dataset::Split;
use crate::error::{BatchError, Result};
use ndarray::Array2;
use ndarray_npy::ReadNpyExt;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Error handling mode for directory loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Stop on the first file that fails to parse (default).
    #[default]
    FailFast,

    /// Skip files that fail to parse, logging a warning for each.
    CollectErrors,
}

/// Per-sequence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMetadata {
    /// Human-readable identifier (file stem for directory sources)
    pub name: String,

    /// Source file, when the sequence came from disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl SequenceMetadata {
    /// Metadata with a name only.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    /// Metadata for a file: the name is the file stem.
    ///
    /// `data/train/jigs_simple_chords_1.mid` → `jigs_simple_chords_1`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self {
            name,
            path: Some(path.to_path_buf()),
        }
    }
}

/// One decoded sequence and its metadata.
#[derive(Debug, Clone)]
pub struct SequenceRecord {
    /// `(length, dims)` frames
    pub sequence: Array2<f64>,

    /// Identity of the sequence
    pub metadata: SequenceMetadata,
}

/// Anything that can produce the raw sequences of a split.
pub trait SequenceSource {
    /// Load the ordered records of `split`.
    fn load_split(&self, split: Split) -> Result<Vec<SequenceRecord>>;
}

// ============================================================================
// Directory Loader
// ============================================================================

/// Signature of `.npy`-style parse functions.
pub type ParseFn = fn(&Path, f64) -> Result<Array2<f64>>;

/// Loads `root/<split>/*` through a parse function.
///
/// The parse function receives the file path and the configured time step
/// and returns a `(length, dims)` array.
#[derive(Debug, Clone)]
pub struct DirectoryLoader<F> {
    root: PathBuf,
    time_step: f64,
    parser: F,
    num_threads: Option<usize>,
    error_mode: ErrorMode,
    extension: Option<String>,
}

impl<F> DirectoryLoader<F>
where
    F: Fn(&Path, f64) -> Result<Array2<f64>> + Sync,
{
    /// Create a loader over `root` with the given parse function.
    pub fn new<P: AsRef<Path>>(root: P, time_step: f64, parser: F) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            time_step,
            parser,
            num_threads: None,
            error_mode: ErrorMode::FailFast,
            extension: None,
        }
    }

    /// Use exactly `threads` worker threads.
    ///
    /// # Panics
    ///
    /// Panics if threads is 0.
    pub fn with_threads(mut self, threads: usize) -> Self {
        assert!(threads > 0, "Thread count must be > 0");
        self.num_threads = Some(threads);
        self
    }

    /// Set the error handling mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Only load files with this extension (no leading dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Directory holding the files of `split`.
    pub fn split_dir(&self, split: Split) -> PathBuf {
        self.root.join(split.as_str())
    }

    /// Sorted list of files to parse for `split`.
    pub fn list_files(&self, split: Split) -> Result<Vec<PathBuf>> {
        let dir = self.split_dir(split);
        let mut files = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(ext) = &self.extension {
                let matches = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext));
                if !matches {
                    continue;
                }
            }
            files.push(path);
        }

        files.sort();
        Ok(files)
    }

    fn parse_all(&self, files: &[PathBuf]) -> Result<Vec<(PathBuf, Result<Array2<f64>>)>> {
        let parse = || {
            files
                .par_iter()
                .map(|path| (path.clone(), (self.parser)(path, self.time_step)))
                .collect::<Vec<_>>()
        };

        // Local pool: build_global() can only be called once per process.
        match self.num_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()?;
                Ok(pool.install(parse))
            }
            None => Ok(parse()),
        }
    }
}

impl<F> SequenceSource for DirectoryLoader<F>
where
    F: Fn(&Path, f64) -> Result<Array2<f64>> + Sync,
{
    fn load_split(&self, split: Split) -> Result<Vec<SequenceRecord>> {
        let files = self.list_files(split)?;
        let parsed = self.parse_all(&files)?;

        let mut records = Vec::with_capacity(parsed.len());
        let mut failed = 0usize;

        for (path, result) in parsed {
            match result {
                Ok(sequence) => records.push(SequenceRecord {
                    sequence,
                    metadata: SequenceMetadata::from_path(&path),
                }),
                Err(e) => match self.error_mode {
                    ErrorMode::FailFast => {
                        log::error!("Failed to parse {}: {}", path.display(), e);
                        return Err(e);
                    }
                    ErrorMode::CollectErrors => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        failed += 1;
                    }
                },
            }
        }

        log::info!(
            "Loaded {} {} sequences from {} ({} skipped)",
            records.len(),
            split,
            self.split_dir(split).display(),
            failed
        );

        Ok(records)
    }
}

/// Read one `(length, dims)` sequence stored as a 2-D `.npy` array.
///
/// The time step is ignored; the array is already discretized.
pub fn read_npy_sequence(path: &Path, _time_step: f64) -> Result<Array2<f64>> {
    let file = File::open(path)?;
    Ok(Array2::<f64>::read_npy(file)?)
}

/// Directory loader over pre-rendered `.npy` piano rolls.
pub fn npy_directory_loader<P: AsRef<Path>>(root: P) -> DirectoryLoader<ParseFn> {
    DirectoryLoader::new(root, 0.0, read_npy_sequence as ParseFn).with_extension("npy")
}

// ============================================================================
// Pre-built Dataset
// ============================================================================

/// Sequences already decoded, keyed by split.
///
/// Serialized layout mirrors a keyed dataset: `train`, `test`, `valid` hold
/// the sequences and `train_metadata`, `test_metadata`, `valid_metadata` the
/// matching metadata. Missing metadata is filled in as `<split>_<index>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrebuiltDataset {
    #[serde(default)]
    pub train: Vec<Array2<f64>>,
    #[serde(default)]
    pub test: Vec<Array2<f64>>,
    #[serde(default)]
    pub valid: Vec<Array2<f64>>,
    #[serde(default)]
    pub train_metadata: Vec<SequenceMetadata>,
    #[serde(default)]
    pub test_metadata: Vec<SequenceMetadata>,
    #[serde(default)]
    pub valid_metadata: Vec<SequenceMetadata>,
}

impl PrebuiltDataset {
    /// Empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sequences and metadata of one split (builder pattern).
    pub fn with_split(
        mut self,
        split: Split,
        sequences: Vec<Array2<f64>>,
        metadata: Vec<SequenceMetadata>,
    ) -> Self {
        let (seqs, meta) = self.split_mut(split);
        *seqs = sequences;
        *meta = metadata;
        self
    }

    fn split_ref(&self, split: Split) -> (&[Array2<f64>], &[SequenceMetadata]) {
        match split {
            Split::Train => (&self.train, &self.train_metadata),
            Split::Test => (&self.test, &self.test_metadata),
            Split::Valid => (&self.valid, &self.valid_metadata),
        }
    }

    fn split_mut(&mut self, split: Split) -> (&mut Vec<Array2<f64>>, &mut Vec<SequenceMetadata>) {
        match split {
            Split::Train => (&mut self.train, &mut self.train_metadata),
            Split::Test => (&mut self.test, &mut self.test_metadata),
            Split::Valid => (&mut self.valid, &mut self.valid_metadata),
        }
    }

    /// Load from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

impl SequenceSource for PrebuiltDataset {
    fn load_split(&self, split: Split) -> Result<Vec<SequenceRecord>> {
        let (sequences, metadata) = self.split_ref(split);

        if !metadata.is_empty() && metadata.len() != sequences.len() {
            return Err(BatchError::shape(format!(
                "{} has {} sequences but {} metadata records",
                split,
                sequences.len(),
                metadata.len()
            )));
        }

        Ok(sequences
            .iter()
            .enumerate()
            .map(|(idx, sequence)| SequenceRecord {
                sequence: sequence.clone(),
                metadata: metadata
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| SequenceMetadata::named(format!("{split}_{idx}"))),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::WriteNpyExt;
    use tempfile::TempDir;

    fn write_roll(dir: &Path, name: &str, len: usize, dims: usize) {
        let roll = Array2::<f64>::from_elem((len, dims), 1.0);
        let file = File::create(dir.join(name)).unwrap();
        roll.write_npy(file).unwrap();
    }

    fn failing_parser(path: &Path, _time_step: f64) -> Result<Array2<f64>> {
        if path.to_string_lossy().contains("broken") {
            Err(BatchError::empty("unparseable"))
        } else {
            Ok(Array2::zeros((2, 3)))
        }
    }

    #[test]
    fn test_metadata_from_path() {
        let meta = SequenceMetadata::from_path("data/train/ashover_simple_chords_3.mid");
        assert_eq!(meta.name, "ashover_simple_chords_3");
        assert_eq!(
            meta.path,
            Some(PathBuf::from("data/train/ashover_simple_chords_3.mid"))
        );
    }

    #[test]
    fn test_npy_loader_sorted_order() {
        let temp_dir = TempDir::new().unwrap();
        let train = temp_dir.path().join("train");
        fs::create_dir(&train).unwrap();
        write_roll(&train, "b.npy", 4, 3);
        write_roll(&train, "a.npy", 7, 3);
        fs::write(train.join("notes.txt"), "ignored").unwrap();

        let loader = npy_directory_loader(temp_dir.path()).with_threads(2);
        let records = loader.load_split(Split::Train).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata.name, "a");
        assert_eq!(records[0].sequence.dim(), (7, 3));
        assert_eq!(records[1].metadata.name, "b");
        assert_eq!(records[1].sequence.dim(), (4, 3));
    }

    #[test]
    fn test_missing_split_dir() {
        let temp_dir = TempDir::new().unwrap();
        let loader = npy_directory_loader(temp_dir.path());
        assert!(matches!(loader.load_split(Split::Valid), Err(BatchError::Io(_))));
    }

    #[test]
    fn test_error_modes() {
        let temp_dir = TempDir::new().unwrap();
        let test_dir = temp_dir.path().join("test");
        fs::create_dir(&test_dir).unwrap();
        fs::write(test_dir.join("good.mid"), b"").unwrap();
        fs::write(test_dir.join("broken.mid"), b"").unwrap();

        let fail_fast = DirectoryLoader::new(temp_dir.path(), 120.0, failing_parser);
        assert!(fail_fast.load_split(Split::Test).is_err());

        let collect = DirectoryLoader::new(temp_dir.path(), 120.0, failing_parser)
            .with_error_mode(ErrorMode::CollectErrors);
        let records = collect.load_split(Split::Test).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.name, "good");
    }

    #[test]
    fn test_time_step_forwarded() {
        let temp_dir = TempDir::new().unwrap();
        let valid = temp_dir.path().join("valid");
        fs::create_dir(&valid).unwrap();
        fs::write(valid.join("x.mid"), b"").unwrap();

        let loader = DirectoryLoader::new(temp_dir.path(), 60.0, |_: &Path, step: f64| {
            Ok(Array2::from_elem((1, 1), step))
        });
        let records = loader.load_split(Split::Valid).unwrap();
        assert_eq!(records[0].sequence[[0, 0]], 60.0);
    }

    #[test]
    #[should_panic(expected = "Thread count must be > 0")]
    fn test_zero_threads() {
        let _ = npy_directory_loader("data").with_threads(0);
    }

    #[test]
    fn test_prebuilt_default_metadata() {
        let dataset = PrebuiltDataset::new().with_split(
            Split::Train,
            vec![Array2::zeros((3, 2)), Array2::zeros((4, 2))],
            vec![],
        );
        let records = dataset.load_split(Split::Train).unwrap();
        assert_eq!(records[1].metadata.name, "train_1");
        assert!(dataset.load_split(Split::Test).unwrap().is_empty());
    }

    #[test]
    fn test_prebuilt_metadata_mismatch() {
        let dataset = PrebuiltDataset::new().with_split(
            Split::Valid,
            vec![Array2::zeros((3, 2))],
            vec![SequenceMetadata::named("a"), SequenceMetadata::named("b")],
        );
        assert!(matches!(
            dataset.load_split(Split::Valid),
            Err(BatchError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_prebuilt_json_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dataset.json");

        let dataset = PrebuiltDataset::new().with_split(
            Split::Test,
            vec![Array2::from_elem((2, 2), 0.5)],
            vec![SequenceMetadata::named("reel_1")],
        );
        dataset.save_json(&path).unwrap();

        let loaded = PrebuiltDataset::load_json(&path).unwrap();
        let records = loaded.load_split(Split::Test).unwrap();
        assert_eq!(records[0].metadata.name, "reel_1");
        assert_eq!(records[0].sequence, Array2::from_elem((2, 2), 0.5));
    }
}
