//! Sequence and split validation.
//!
//! Catches malformed inputs before batching and checks that a batched split
//! still satisfies the structural guarantees the epoch runner and the accuracy
//! evaluator rely on.
//!
//! # Validation Categories
//!
//! 1. **Sequence values**: NaN/Inf detection, piano-roll range `[0, 1]`
//! 2. **Sequence shape**: empty sequences, channel count agreement
//! 3. **Split structure**: chunk shapes, rolled-length arithmetic, padding,
//!    target alignment
//!
//! # Usage
//!
//! ```ignore
//! use pianoroll_batcher::validation::{validate_split, SequenceValidator};
//!
//! let result = SequenceValidator::default().validate_sequences(&rolls);
//! if result.has_errors() {
//!     for error in result.errors() {
//!         log::error!("{error}");
//!     }
//! }
//!
//! let result = validate_split(&dataset.train);
//! log::info!("{result}");
//! ```

use crate::batching::rolled_length;
use crate::dataset::SplitData;
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2};
use std::fmt;

/// Outcome of one named check.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Valid,
    Warning(String),
    Error(String),
}

impl ValidationLevel {
    /// `Valid` when `ok`, otherwise an error built from `message`.
    pub fn error_unless(ok: bool, message: impl FnOnce() -> String) -> Self {
        if ok {
            ValidationLevel::Valid
        } else {
            ValidationLevel::Error(message())
        }
    }

    /// Warning or error text, `None` for `Valid`.
    pub fn message(&self) -> Option<&str> {
        match self {
            ValidationLevel::Valid => None,
            ValidationLevel::Warning(msg) | ValidationLevel::Error(msg) => Some(msg),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationLevel::Valid)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, ValidationLevel::Warning(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationLevel::Error(_))
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::Valid => f.write_str("ok"),
            ValidationLevel::Warning(msg) => write!(f, "warning: {msg}"),
            ValidationLevel::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// A named check and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub level: ValidationLevel,
}

/// Every check run over a sequence set or split, in order.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    checks: Vec<Check>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, level: ValidationLevel) {
        self.checks.push(Check {
            name: name.to_string(),
            level,
        });
    }

    /// Append the checks of `other` as `scope/name`.
    pub fn extend_scoped(&mut self, scope: &str, other: ValidationResult) {
        self.checks
            .extend(other.checks.into_iter().map(|check| Check {
                name: format!("{scope}/{}", check.name),
                level: check.level,
            }));
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Whether a check called `name` was run.
    pub fn ran(&self, name: &str) -> bool {
        self.checks.iter().any(|check| check.name == name)
    }

    /// No errors and no warnings.
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|check| check.level.is_valid())
    }

    pub fn has_errors(&self) -> bool {
        self.checks.iter().any(|check| check.level.is_error())
    }

    pub fn has_warnings(&self) -> bool {
        self.checks.iter().any(|check| check.level.is_warning())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.describe(ValidationLevel::is_warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.describe(ValidationLevel::is_error)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|check| check.level.is_valid()).count()
    }

    /// `"name: message"` for each check whose level matches `keep`.
    fn describe(&self, keep: fn(&ValidationLevel) -> bool) -> Vec<String> {
        self.checks
            .iter()
            .filter(|check| keep(&check.level))
            .filter_map(|check| {
                check
                    .level
                    .message()
                    .map(|msg| format!("{}: {msg}", check.name))
            })
            .collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} checks passed", self.passed_count(), self.checks.len())?;
        for check in self.checks.iter().filter(|c| !c.level.is_valid()) {
            write!(f, "\n  {} {}", check.name, check.level)?;
        }
        Ok(())
    }
}

// ============================================================================
// Sequence validation
// ============================================================================

/// Configuration for sequence validation.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Check for NaN/Inf values
    pub check_nan_inf: bool,

    /// Warn on values outside `value_range`
    pub check_range: bool,

    /// Expected value range (inclusive)
    pub value_range: (f64, f64),

    /// Require every sequence to have this many channels
    pub expected_dim: Option<usize>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            check_nan_inf: true,
            check_range: true,
            value_range: (0.0, 1.0),
            expected_dim: None,
        }
    }
}

/// Validator for raw `(length, dims)` sequences.
#[derive(Debug, Clone, Default)]
pub struct SequenceValidator {
    config: ValidationConfig,
}

impl SequenceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single sequence.
    pub fn validate_sequence(&self, sequence: ArrayView2<'_, f64>) -> ValidationResult {
        let mut result = ValidationResult::new();
        let (len, dims) = sequence.dim();

        if len == 0 || dims == 0 {
            result.add(
                "shape",
                ValidationLevel::Error(format!("empty sequence ({len} x {dims})")),
            );
            return result;
        }
        if len == 1 {
            result.add(
                "shape",
                ValidationLevel::Warning("single-step sequence has no targets".to_string()),
            );
        } else {
            result.add("shape", ValidationLevel::Valid);
        }

        if let Some(expected) = self.config.expected_dim {
            result.add(
                "dims",
                ValidationLevel::error_unless(dims == expected, || {
                    format!("expected {expected} channels, got {dims}")
                }),
            );
        }

        if self.config.check_nan_inf {
            match sequence.indexed_iter().find(|(_, v)| !v.is_finite()) {
                Some(((t, c), v)) => result.add(
                    "nan_inf_check",
                    ValidationLevel::Error(format!("non-finite value {v} at step {t}, channel {c}")),
                ),
                None => result.add("nan_inf_check", ValidationLevel::Valid),
            }
        }

        if self.config.check_range {
            let (lo, hi) = self.config.value_range;
            let outside = sequence
                .iter()
                .filter(|v| v.is_finite() && (**v < lo || **v > hi))
                .count();
            if outside > 0 {
                result.add(
                    "value_range",
                    ValidationLevel::Warning(format!("{outside} values outside [{lo}, {hi}]")),
                );
            } else {
                result.add("value_range", ValidationLevel::Valid);
            }
        }

        result
    }

    /// Validate a set of sequences, including channel agreement between them.
    pub fn validate_sequences(&self, sequences: &[Array2<f64>]) -> ValidationResult {
        let mut result = ValidationResult::new();

        if sequences.is_empty() {
            result.add(
                "sequences",
                ValidationLevel::Warning("No sequences to validate".to_string()),
            );
            return result;
        }

        let first_dim = sequences[0].ncols();
        match sequences.iter().position(|seq| seq.ncols() != first_dim) {
            Some(idx) => result.add(
                "dims_agree",
                ValidationLevel::Error(format!(
                    "sequence {} has {} channels, sequence 0 has {}",
                    idx,
                    sequences[idx].ncols(),
                    first_dim
                )),
            ),
            None => result.add("dims_agree", ValidationLevel::Valid),
        }

        for (idx, seq) in sequences.iter().enumerate() {
            result.extend_scoped(&format!("sequence_{idx}"), self.validate_sequence(seq.view()));
        }

        result
    }
}

// ============================================================================
// Split validation
// ============================================================================

/// Check the structural invariants of a batched split.
///
/// - per-chunk vectors agree in length, every chunk is `(L, N, D)`
/// - `unrolled_lengths` and `metadata` hold one entry per sequence
/// - every sequence fits in the chunks (`unrolled + 1 <= T * L`)
///
/// A zero `time_batch_len`, mismatched chunk counts or shapes and sequences
/// that overrun the chunks stop validation early.
/// - `rolled_lengths[t][s] == clamp(unrolled[s] - t * L, 0, L)` and they sum to `unrolled[s]`
/// - inputs and targets are zero from step `unrolled[s]` on
/// - `targets[i] == inputs[i + 1]` for `i + 1 < unrolled[s]`
pub fn validate_split(split: &SplitData) -> ValidationResult {
    let mut result = ValidationResult::new();
    let chunks = split.num_time_batches();
    let n = split.num_sequences();
    let l = split.time_batch_len;

    if chunks == 0 {
        result.add("chunks", ValidationLevel::Warning("split has no chunks".to_string()));
        return result;
    }

    if l == 0 {
        result.add(
            "time_batch_len",
            ValidationLevel::Error("time_batch_len is 0".to_string()),
        );
        return result;
    }

    if split.targets.len() != chunks || split.rolled_lengths.len() != chunks {
        result.add(
            "chunk_counts",
            ValidationLevel::Error(format!(
                "{} batches, {} targets, {} rolled-length arrays",
                chunks,
                split.targets.len(),
                split.rolled_lengths.len()
            )),
        );
        return result;
    }
    result.add("chunk_counts", ValidationLevel::Valid);

    let dims = split.input_dim();
    let expected = (l, n, dims);
    let bad_shape = split
        .batches
        .iter()
        .chain(&split.targets)
        .position(|chunk| chunk.dim() != expected);
    if let Some(idx) = bad_shape {
        result.add(
            "chunk_shapes",
            ValidationLevel::Error(format!(
                "array {idx} does not have shape {expected:?} (batches first, then targets)"
            )),
        );
        return result;
    }
    result.add("chunk_shapes", ValidationLevel::Valid);

    result.add(
        "metadata",
        ValidationLevel::error_unless(split.metadata.len() == n, || {
            format!("{} metadata records for {n} sequences", split.metadata.len())
        }),
    );

    let total_steps = chunks * l;
    // Later checks index frames by step and need every step to exist.
    if let Some(s) = split.unrolled_lengths.iter().position(|&u| u >= total_steps) {
        result.add(
            "coverage",
            ValidationLevel::Error(format!(
                "sequence {} needs {} steps, chunks hold {}",
                s,
                split.unrolled_lengths[s] + 1,
                total_steps
            )),
        );
        return result;
    }
    result.add("coverage", ValidationLevel::Valid);

    result.add("rolled_lengths", check_rolled_lengths(split));
    result.add("padding", check_padding(split));
    result.add("target_alignment", check_alignment(split));

    result
}

fn check_rolled_lengths(split: &SplitData) -> ValidationLevel {
    let l = split.time_batch_len;
    for (t, rolled) in split.rolled_lengths.iter().enumerate() {
        if rolled.len() != split.num_sequences() {
            return ValidationLevel::Error(format!(
                "chunk {t}: {} rolled lengths for {} sequences",
                rolled.len(),
                split.num_sequences()
            ));
        }
        for (s, &got) in rolled.iter().enumerate() {
            let want = rolled_length(split.unrolled_lengths[s], t, l);
            if got != want {
                return ValidationLevel::Error(format!(
                    "chunk {t}, sequence {s}: rolled length {got}, expected {want}"
                ));
            }
        }
    }
    for (s, &unrolled) in split.unrolled_lengths.iter().enumerate() {
        let sum: usize = split.rolled_lengths.iter().map(|r| r[s]).sum();
        if sum != unrolled {
            return ValidationLevel::Error(format!(
                "sequence {s}: rolled lengths sum to {sum}, unrolled length is {unrolled}"
            ));
        }
    }
    ValidationLevel::Valid
}

/// Step `i` of sequence `s` lives in chunk `i / L` at offset `i % L`.
fn frame(chunks: &[Array3<f64>], l: usize, i: usize, s: usize) -> ArrayView1<'_, f64> {
    chunks[i / l].slice(s![i % l, s, ..])
}

fn check_padding(split: &SplitData) -> ValidationLevel {
    let l = split.time_batch_len;
    let total_steps = split.num_time_batches() * l;
    for (s, &unrolled) in split.unrolled_lengths.iter().enumerate() {
        for i in unrolled..total_steps {
            let input_zero = frame(&split.batches, l, i, s).iter().all(|&v| v == 0.0);
            let target_zero = frame(&split.targets, l, i, s).iter().all(|&v| v == 0.0);
            if !(input_zero && target_zero) {
                return ValidationLevel::Error(format!(
                    "sequence {s}: non-zero padding at step {i} (unrolled length {unrolled})"
                ));
            }
        }
    }
    ValidationLevel::Valid
}

fn check_alignment(split: &SplitData) -> ValidationLevel {
    let l = split.time_batch_len;
    for (s, &unrolled) in split.unrolled_lengths.iter().enumerate() {
        for i in 0..unrolled.saturating_sub(1) {
            let target = frame(&split.targets, l, i, s);
            let next_input = frame(&split.batches, l, i + 1, s);
            if target != next_input {
                return ValidationLevel::Error(format!(
                    "sequence {s}: target at step {i} differs from input at step {}",
                    i + 1
                ));
            }
        }
    }
    ValidationLevel::Valid
}
