//! layercake-hash CLI - Per-tensor content hashing for safetensors checkpoints.

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use layercake_checkpoint::{
    compare_containers, discover_models, hash_corpus, ComparisonReport, ContainerReader,
    HashConfig, ModelOutcome, TensorHasher, TensorMatch,
};
use layercake_core::{DigestAlgorithm, EstimatorKind, ManifestStore};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// JSON output for a hashed container.
#[derive(Serialize)]
struct FileJsonOutput<'a> {
    input: String,
    elapsed_secs: f64,
    throughput_mib_s: f64,
    manifest: &'a layercake_core::FileManifest,
}

/// JSON output for `info`.
#[derive(Serialize)]
struct InfoJsonOutput {
    input: String,
    header_len: u64,
    payload_len: u64,
    tensors: Vec<InfoTensor>,
}

#[derive(Serialize)]
struct InfoTensor {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dtype: Option<String>,
    shape: Vec<u64>,
    start: u64,
    end: u64,
}

/// Digest algorithm.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum AlgorithmArg {
    /// SHA-256 (matches existing manifests)
    Sha256,
    /// BLAKE3 (faster, not comparable with SHA-256 manifests)
    Blake3,
}

impl From<AlgorithmArg> for DigestAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Sha256 => DigestAlgorithm::Sha256,
            AlgorithmArg::Blake3 => DigestAlgorithm::Blake3,
        }
    }
}

/// Compressed-size estimator.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum EstimateArg {
    /// Deflate (default)
    Deflate,
    /// Zstd
    Zstd,
    /// LZ4
    Lz4,
    /// Skip the estimate
    None,
}

impl EstimateArg {
    fn kind(self) -> Option<EstimatorKind> {
        match self {
            EstimateArg::Deflate => Some(EstimatorKind::Deflate),
            EstimateArg::Zstd => Some(EstimatorKind::Zstd),
            EstimateArg::Lz4 => Some(EstimatorKind::Lz4),
            EstimateArg::None => None,
        }
    }
}

/// Per-tensor content hashing for safetensors checkpoints.
///
/// Writes one `hashes.json` manifest per model, recording a digest and byte
/// count for every tensor.
#[derive(Parser, Debug)]
#[command(name = "layercake-hash")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log progress details (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hash every model under a downloads directory
    Corpus(CorpusArgs),
    /// Hash a single container and print its manifest
    File(FileArgs),
    /// Show container header entries without reading tensor data
    Info(InfoArgs),
    /// Compare two containers tensor by tensor
    Compare(CompareArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(Args, Debug, Clone, Copy)]
struct HashOptions {
    /// Digest algorithm
    #[arg(long, value_enum, default_value = "sha256")]
    algorithm: AlgorithmArg,

    /// Compressed-size estimator
    #[arg(long, value_enum, default_value = "deflate")]
    estimate: EstimateArg,

    /// Estimator compression level (codec default if omitted)
    #[arg(short, long)]
    level: Option<i32>,
}

impl HashOptions {
    fn config(&self) -> HashConfig {
        let estimate = self.estimate.kind();
        let level = self
            .level
            .unwrap_or_else(|| estimate.map_or(0, EstimatorKind::default_level));
        HashConfig::default()
            .with_algorithm(self.algorithm.into())
            .with_estimate(estimate)
            .with_level(level)
    }
}

#[derive(Parser, Debug)]
struct CorpusArgs {
    /// Downloads directory laid out as <account>/<model>/*.safetensors
    #[arg(value_name = "MODELS_DIR")]
    models_dir: PathBuf,

    /// Results directory for manifests
    #[arg(short, long, value_name = "RESULTS_DIR")]
    output: PathBuf,

    #[command(flatten)]
    hash: HashOptions,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Re-hash models that already have a manifest
    #[arg(long)]
    force: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Show progress bar
    #[arg(long)]
    progress: bool,
}

#[derive(Parser, Debug)]
struct FileArgs {
    /// Input container
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[command(flatten)]
    hash: HashOptions,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input container
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct CompareArgs {
    /// First container
    #[arg(value_name = "A")]
    left: PathBuf,

    /// Second container
    #[arg(value_name = "B")]
    right: PathBuf,

    /// Digest algorithm
    #[arg(long, value_enum, default_value = "sha256")]
    algorithm: AlgorithmArg,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

/// Create a progress bar with a standard style.
fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(msg.to_string());
    pb
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_corpus(args: CorpusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args
        .hash
        .config()
        .with_threads(args.threads)
        .with_overwrite(args.force);

    let models = discover_models(&args.models_dir)?;
    if !args.json {
        eprintln!("Configuration:");
        eprintln!("  Models dir:  {}", args.models_dir.display());
        eprintln!("  Results dir: {}", args.output.display());
        eprintln!("  Algorithm:   {}", config.algorithm.as_str());
        eprintln!(
            "  Estimate:    {}",
            match config.estimate {
                Some(kind) => format!("{:?} (level {})", kind, config.level).to_lowercase(),
                None => "none".to_string(),
            }
        );
        eprintln!("  Models:      {}", models.len());
        eprintln!();
    }

    let store = ManifestStore::new(&args.output);
    let pb = if args.progress {
        Some(create_progress_bar(models.len() as u64, "Hashing models"))
    } else {
        None
    };

    let summary = hash_corpus(&models, &store, &config, |outcome| {
        if let Some(ref pb) = pb {
            if let ModelOutcome::Hashed { key, .. } = outcome {
                pb.set_message(key.to_string());
            }
            pb.inc(1);
        }
    })?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        eprintln!("Hashing Results:");
        eprintln!("  Hashed:     {}", summary.hashed);
        eprintln!("  Skipped:    {} (manifest exists)", summary.skipped);
        eprintln!("  Failed:     {}", summary.failed.len());
        eprintln!("  Tensors:    {}", summary.tensors);
        eprintln!("  Data:       {}", format_size(summary.bytes));
        eprintln!("  Time:       {:.3}s", summary.elapsed_secs);
        eprintln!("  Throughput: {:.2} MiB/s", summary.throughput_mib_s());
        for failure in &summary.failed {
            eprintln!("  ! {}: {}", failure.model, failure.error);
        }
    }

    if !summary.failed.is_empty() && summary.hashed == 0 && summary.skipped == 0 {
        return Err(format!("all {} models failed", summary.failed.len()).into());
    }
    Ok(())
}

fn run_file(args: FileArgs) -> Result<(), Box<dyn std::error::Error>> {
    let hasher = TensorHasher::new(&args.hash.config());
    let start = Instant::now();
    let manifest = hasher.hash_file(&args.input)?;
    let elapsed = start.elapsed().as_secs_f64();
    let throughput = if elapsed > 0.0 {
        manifest.total_bytes() as f64 / elapsed / (1024.0 * 1024.0)
    } else {
        0.0
    };

    if args.json {
        let output = FileJsonOutput {
            input: args.input.display().to_string(),
            elapsed_secs: elapsed,
            throughput_mib_s: throughput,
            manifest: &manifest,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Container: {}", args.input.display());
    println!("Algorithm: {}", hasher.algorithm());
    println!("Tensors:   {}", manifest.len());
    println!("Data:      {}", format_size(manifest.total_bytes()));
    println!();
    println!("{:<40} {:>12} {:>12}  {}", "Name", "Size", "Est. comp.", "Digest");
    println!("{}", "-".repeat(134));
    for (name, record) in &manifest.tensors {
        println!(
            "{:<40} {:>12} {:>12}  {}",
            truncate_name(name, 40),
            format_size(record.byte_count),
            record
                .compressed_byte_count
                .map_or_else(|| "-".to_string(), format_size),
            record.digest
        );
    }
    eprintln!();
    eprintln!("Time: {:.3}s ({:.2} MiB/s)", elapsed, throughput);
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reader = ContainerReader::open(&args.input)?;

    if args.json {
        let output = InfoJsonOutput {
            input: args.input.display().to_string(),
            header_len: reader.header_len(),
            payload_len: reader.payload_len(),
            tensors: reader
                .tensors()
                .map(|t| InfoTensor {
                    name: t.name.clone(),
                    dtype: t.dtype.clone(),
                    shape: t.shape.clone(),
                    start: t.start,
                    end: t.end,
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let total: u64 = reader.tensors().map(|t| t.byte_count()).sum();
    println!("Safetensors file: {}", args.input.display());
    println!("Tensors: {}", reader.len());
    println!("Header:  {}", format_size(reader.header_len()));
    println!("Payload: {}", format_size(reader.payload_len()));
    println!("Tensor data: {}", format_size(total));
    println!();
    println!("{:<40} {:>12} {:>10} {:>20}", "Name", "Size", "DType", "Shape");
    println!("{}", "-".repeat(86));
    for span in reader.tensors() {
        println!(
            "{:<40} {:>12} {:>10} {:>20}",
            truncate_name(&span.name, 40),
            format_size(span.byte_count()),
            span.dtype.as_deref().unwrap_or("?"),
            format_shape(&span.shape)
        );
    }
    Ok(())
}

fn run_compare(args: CompareArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = HashConfig::digest_only().with_algorithm(args.algorithm.into());
    let hasher = TensorHasher::new(&config);
    let report = compare_containers(&hasher, &args.left, &args.right)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_comparison(&report);
    }
    Ok(())
}

fn print_comparison(report: &ComparisonReport) {
    println!("A: {}", report.left);
    println!("B: {}", report.right);
    println!();
    for row in &report.tensors {
        let marker = match row.status {
            TensorMatch::Identical => "=",
            TensorMatch::Different => "~",
            TensorMatch::OnlyLeft => "<",
            TensorMatch::OnlyRight => ">",
        };
        println!("{} {}", marker, truncate_name(&row.name, 78));
    }
    println!();
    println!("Identical:  {} ({})", report.identical, format_size(report.identical_bytes));
    println!("Different:  {}", report.different);
    println!("Only in A:  {}", report.only_left);
    println!("Only in B:  {}", report.only_right);
}

fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let tail: String = name
            .chars()
            .rev()
            .take(max_len - 3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{}", tail)
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn format_shape(shape: &[u64]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("[{}]", dims.join(", "))
}

fn run_completions(args: CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "layercake-hash", &mut io::stdout());
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Corpus(args) => run_corpus(args),
        Commands::File(args) => run_file(args),
        Commands::Info(args) => run_info(args),
        Commands::Compare(args) => run_compare(args),
        Commands::Completions(args) => {
            run_completions(args);
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
