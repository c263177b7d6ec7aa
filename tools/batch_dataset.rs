//! Piano-Roll Dataset Batching Tool
//!
//! Configuration-driven tool that turns a directory of piano-roll sequences
//! into chunked, target-shifted NumPy arrays ready for truncated BPTT.
//!
//! # Input Layout
//!
//! ```text
//! input_dir/
//! ├── train/*.npy   (length, dims) f64
//! ├── test/*.npy
//! └── valid/*.npy
//! ```
//!
//! # Output Format
//!
//! - `{split}_inputs.npy` / `{split}_targets.npy` - `[T_chunks, L, N, D]`
//! - `{split}_rolled_lengths.npy` - `[T_chunks, N]`
//! - `{split}_unrolled_lengths.npy` - `[N]`
//! - `{split}_metadata.json`, `dataset_summary.json`
//!
//! # Usage
//!
//! ```bash
//! # From TOML config
//! cargo run --release --bin batch_dataset -- --config configs/nottingham.toml
//!
//! # Generate sample config
//! cargo run --release --bin batch_dataset -- --generate-config nottingham.toml
//! ```
//!
//! Set `RUST_LOG=debug` for per-file and per-chunk logging.

use pianoroll_batcher::config::{BatchingConfig, DataPathConfig, DatasetConfig, ExperimentInfo};
use pianoroll_batcher::export::DatasetExporter;
use pianoroll_batcher::loader::{read_npy_sequence, DirectoryLoader, ParseFn};
use pianoroll_batcher::validation::{validate_split, SequenceValidator};
use pianoroll_batcher::{DatasetAssembler, Split};
use std::time::Instant;

const USAGE: &str = "\
Piano-Roll Dataset Batching Tool

Usage:
    batch_dataset --config <path.toml>       Batch and export the dataset described by a config
    batch_dataset --generate-config <path>   Write a sample config to <path>
    batch_dataset --help                     Show this help";

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = raw.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["--config", path] => run_from_config(path),
        ["--generate-config", path] => generate_sample_config(path),
        ["--help"] | ["-h"] => println!("{USAGE}"),
        [flag @ ("--config" | "--generate-config")] => {
            eprintln!("Error: {flag} requires a path argument\n\n{USAGE}");
            std::process::exit(1);
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn generate_sample_config(path: &str) {
    let sample_config = DatasetConfig::new(DataPathConfig::new(
        "/path/to/data/nottingham",
        "/path/to/exports/nottingham_chunked",
    ))
    .with_experiment(ExperimentInfo {
        name: "Nottingham TBPTT".to_string(),
        description: "128-step chunks, train/valid capped at 10 chunks".to_string(),
        version: "1.0.0".to_string(),
    })
    .with_batching(BatchingConfig::new(128, 10));

    match sample_config.save_toml(path) {
        Ok(()) => {
            println!("✅ Generated sample config: {}", path);
            println!("\nEdit the following fields before running:");
            println!("  - data.input_dir: Directory with train/, test/, valid/ subdirectories");
            println!("  - data.output_dir: Path for exported arrays");
            println!("  - batching.time_batch_len: Chunk length (-1 for a single chunk)");
            println!("  - batching.max_time_batches: Chunk cap (-1 for none)");
        }
        Err(e) => {
            eprintln!("Error generating config: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_from_config(config_path: &str) {
    let config = match DatasetConfig::load_toml(config_path) {
        Ok(c) => {
            println!("✅ Loaded configuration: {}", config_path);
            c
        }
        Err(e) => {
            eprintln!("❌ Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    print_config_summary(&config);

    if let Err(e) = config.validate() {
        eprintln!("❌ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    println!("✅ Configuration validated");
    println!();

    if let Err(e) = run_batching(&config) {
        eprintln!("❌ Batching failed: {}", e);
        std::process::exit(1);
    }
}

fn print_config_summary(config: &DatasetConfig) {
    let fmt_opt = |v: Option<usize>| v.map_or_else(|| "none".to_string(), |v| v.to_string());

    println!("┌─ Configuration Summary ───────────────────────────────────────┐");
    println!("│ Experiment: {:<49} │", config.experiment.name);
    println!("│");
    println!("│ Batching:");
    println!("│   Time step:        {}", config.batching.time_step);
    println!("│   Chunk length:     {}", fmt_opt(config.batching.time_batch_len()));
    println!("│   Max chunks:       {}", fmt_opt(config.batching.max_time_batches()));
    println!("│");
    println!("│ Input:      {}", config.data.input_dir.display());
    println!("│ Output:     {}", config.data.output_dir.display());
    println!("└────────────────────────────────────────────────────────────────┘");
    println!();
}

fn run_batching(config: &DatasetConfig) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let mut loader = DirectoryLoader::new(
        &config.data.input_dir,
        config.batching.time_step,
        read_npy_sequence as ParseFn,
    )
    .with_error_mode(config.processing.error_mode);
    if let Some(threads) = config.processing.threads {
        loader = loader.with_threads(threads);
    }
    if let Some(ext) = &config.processing.file_extension {
        loader = loader.with_extension(ext.clone());
    }

    println!("🚀 Loading, checking and batching splits...");
    let dataset = DatasetAssembler::new(config.batching.clone())
        .with_sequence_validator(SequenceValidator::new())
        .assemble(&loader)?;

    let mut invalid = false;
    for split in Split::ALL {
        let data = dataset.split(split);
        println!(
            "━━━ {} : {} sequences, {} chunks ━━━",
            split,
            data.num_sequences(),
            data.num_time_batches()
        );

        let result = validate_split(data);
        if result.has_errors() {
            invalid = true;
            for err in result.errors() {
                eprintln!("    ❌ {}", err);
            }
        }
        for warning in result.warnings() {
            println!("    ⚠️  {}", warning);
        }
    }
    if invalid {
        return Err("dataset failed structural validation".into());
    }

    let exporter =
        DatasetExporter::new(&config.data.output_dir).with_config(config.batching.clone());
    let summary = exporter.export(&dataset)?;

    println!();
    println!("✅ Exported {} splits to {}", summary.splits.len(), config.data.output_dir.display());
    println!("   input_dim: {}", summary.input_dim);
    println!("   elapsed:   {:.2?}", start.elapsed());

    Ok(())
}
