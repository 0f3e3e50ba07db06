//! layercake-dedup CLI - Tensor deduplication analysis over hash manifests.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use layercake_core::ManifestStore;
use layercake_dedup::{
    analyze_store, prune_incomplete, AnalysisConfig, CorpusReport, IntegrityFilter,
    IntegrityPolicy,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// JSON output for `analyze`.
#[derive(Serialize)]
struct AnalyzeJsonOutput<'a> {
    results_dir: String,
    elapsed_secs: f64,
    #[serde(flatten)]
    report: &'a CorpusReport,
}

/// Tensor deduplication analysis over hash manifests.
///
/// Reads the per-model manifests written by layercake-hash and reports how
/// much storage content-addressed deduplication would save.
#[derive(Parser, Debug)]
#[command(name = "layercake-dedup")]
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
    /// Analyze savings, similarity and hot digests across a results directory
    Analyze(AnalyzeArgs),
    /// Remove incomplete manifests so their models get re-hashed
    Prune(PruneArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Results directory laid out as <account>/<model>/hashes.json
    #[arg(value_name = "RESULTS_DIR")]
    results_dir: PathBuf,

    /// Number of hot digests to list
    #[arg(long, default_value = "10")]
    top: usize,

    /// Number of most similar file pairs to list
    #[arg(long, default_value = "20")]
    top_pairs: usize,

    /// Similarity threshold (0.0-1.0) for the over-threshold counts
    #[arg(short, long, default_value = "0.7")]
    threshold: f64,

    /// Stop pairwise comparison after this many pairs
    #[arg(long)]
    max_pairs: Option<usize>,

    /// Skip the pairwise similarity pass
    #[arg(long)]
    no_similarity: bool,

    /// Treat legacy manifests without compressed_size as incomplete
    #[arg(long)]
    legacy_requires_estimate: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Show progress bar
    #[arg(long)]
    progress: bool,
}

#[derive(Parser, Debug)]
struct PruneArgs {
    /// Results directory laid out as <account>/<model>/hashes.json
    #[arg(value_name = "RESULTS_DIR")]
    results_dir: PathBuf,

    /// List what would be removed without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Treat legacy manifests without compressed_size as incomplete
    #[arg(long)]
    legacy_requires_estimate: bool,

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

fn run_analyze(args: AnalyzeArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&args.threshold) {
        return Err(format!("threshold must be between 0 and 1, got {}", args.threshold).into());
    }
    if !args.results_dir.is_dir() {
        return Err(format!("results directory not found: {}", args.results_dir.display()).into());
    }

    let config = AnalysisConfig::default()
        .with_top_k(args.top)
        .with_top_pairs(args.top_pairs)
        .with_threshold(args.threshold)
        .with_max_pairs(args.max_pairs)
        .with_similarity(!args.no_similarity);
    let policy = IntegrityPolicy::default().with_legacy_requires_estimate(args.legacy_requires_estimate);
    let store = ManifestStore::new(&args.results_dir);

    let pb = if args.progress {
        Some(create_progress_bar(store.keys()?.len() as u64, "Loading manifests"))
    } else {
        None
    };

    let start = Instant::now();
    let report = analyze_store(&store, config, policy, |key| {
        if let Some(ref pb) = pb {
            pb.set_message(key.to_string());
            pb.inc(1);
        }
    })?;
    let elapsed = start.elapsed().as_secs_f64();

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if args.json {
        let output = AnalyzeJsonOutput {
            results_dir: args.results_dir.display().to_string(),
            elapsed_secs: elapsed,
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report, elapsed);
    }
    Ok(())
}

fn print_report(report: &CorpusReport, elapsed: f64) {
    println!("Files:");
    println!("  Processed:  {}", report.files_processed);
    println!("  Incomplete: {} (excluded)", report.files_incomplete);
    println!("  Failed:     {} (unreadable)", report.files_failed);
    for failure in &report.failures {
        println!("    ! {}: {}", failure.path, failure.error);
    }
    if report.hash_algorithms.len() > 1 {
        let names: Vec<&str> = report.hash_algorithms.keys().map(String::as_str).collect();
        println!("  Warning: mixed digest algorithms ({})", names.join(", "));
    }

    let s = &report.savings;
    println!();
    println!("Global savings (traversal order: account, model):");
    println!("  Tensors:    {} ({} duplicates)", s.total_tensors, s.duplicate_tensors);
    println!("  Total:      {}", format_size(s.total_bytes));
    println!("  Saved:      {}", format_size(s.saved_bytes));
    println!(
        "  Percent:    {:.2}% across {} files",
        s.percent_saved, report.files_processed
    );

    let r = &report.ranking;
    println!();
    println!("Most common tensors ({} distinct non-empty):", r.tracked_digests);
    println!("{:<66} {:>8} {:>12} {:>12}", "Digest", "Count", "Size", "Total");
    println!("{}", "-".repeat(101));
    for hot in &r.top {
        println!(
            "{:<66} {:>8} {:>12} {:>12}",
            hot.digest,
            hot.occurrences,
            format_size(hot.byte_count),
            format_size(hot.total_bytes)
        );
    }
    println!(
        "Total size: {}  Savings: {}  ({:.2}%)",
        format_size(r.total_bytes),
        format_size(r.savings_bytes),
        r.percent_saved
    );

    if let Some(sim) = &report.similarity {
        println!();
        println!(
            "Pairwise similarity ({} of {} pairs compared{}):",
            sim.pairs_compared,
            sim.pairs_total,
            if sim.truncated { ", truncated" } else { "" }
        );
        for pair in &sim.top_pairs {
            println!(
                "  {} and {}: [{}/{} shared] {:.2}% ({} shared)",
                pair.left,
                pair.right,
                pair.shared_digests,
                pair.left_digests.max(pair.right_digests),
                pair.similarity * 100.0,
                format_size(pair.shared_bytes)
            );
        }
        println!(
            "  {} pairs and {} of {} files at or above {:.0}% similar",
            sim.pairs_over_threshold,
            sim.files_over_threshold,
            sim.files,
            sim.threshold * 100.0
        );
    }

    eprintln!();
    eprintln!("Time: {:.3}s", elapsed);
}

fn run_prune(args: PruneArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.results_dir.is_dir() {
        return Err(format!("results directory not found: {}", args.results_dir.display()).into());
    }

    let policy = IntegrityPolicy::default().with_legacy_requires_estimate(args.legacy_requires_estimate);
    let store = ManifestStore::new(&args.results_dir);
    let report = prune_incomplete(&store, &IntegrityFilter::new(policy), args.dry_run, |_| {})?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let verb = if args.dry_run { "Would remove" } else { "Removed" };
    for pruned in &report.removed {
        eprintln!("{} {} ({})", verb, pruned.key, pruned.reason);
    }
    for failure in &report.unreadable {
        eprintln!("Unreadable {} ({})", failure.path, failure.error);
    }
    eprintln!(
        "{} incomplete, {} unreadable, {} total",
        report.removed.len(),
        report.unreadable.len(),
        report.scanned
    );
    Ok(())
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

fn run_completions(args: CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "layercake-dedup", &mut io::stdout());
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Prune(args) => run_prune(args),
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
