//! Benchmarks for corpus analysis.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use layercake_core::{FileManifest, TensorRecord};
use layercake_dedup::{AnalysisConfig, DedupAnalyzer, IntegrityPolicy};
use std::hint::black_box;

/// Synthetic corpus: every model shares a base, families share more.
fn generate_corpus(files: usize, tensors_per_file: usize) -> Vec<FileManifest> {
    (0..files)
        .map(|f| {
            let mut manifest = FileManifest::new(format!("account-{}/model-{}", f % 17, f));
            for t in 0..tensors_per_file {
                let digest = match t % 4 {
                    0 => format!("{:064x}", t),
                    1 => format!("{:064x}", (f % 8) * 1_000_000 + t),
                    _ => format!("{:064x}", f * 1_000_000_000 + t),
                };
                manifest.insert(
                    format!("layers.{}.weight", t),
                    TensorRecord::new(digest, 4096 + t as u64),
                );
            }
            manifest.mark_complete();
            manifest
        })
        .collect()
}

fn bench_ingest(c: &mut Criterion) {
    let corpus = generate_corpus(500, 200);
    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Elements((500 * 200) as u64));

    group.bench_function("savings_and_ranking", |b| {
        b.iter(|| {
            let config = AnalysisConfig::default().with_similarity(false);
            let mut analyzer = DedupAnalyzer::new(config, IntegrityPolicy::default());
            for manifest in &corpus {
                analyzer.ingest(manifest);
            }
            black_box(analyzer.finish())
        })
    });
    group.finish();
}

fn bench_pairwise(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairwise");
    group.sample_size(10);

    for files in [100, 400] {
        let corpus = generate_corpus(files, 200);
        group.throughput(Throughput::Elements((files * (files - 1) / 2) as u64));
        group.bench_with_input(BenchmarkId::new("files", files), &corpus, |b, corpus| {
            b.iter(|| {
                let mut analyzer =
                    DedupAnalyzer::new(AnalysisConfig::default(), IntegrityPolicy::default());
                for manifest in corpus {
                    analyzer.ingest(manifest);
                }
                black_box(analyzer.finish())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ingest, bench_pairwise);
criterion_main!(benches);
