//! Benchmarks for the retrieval hot path.
//!
//! Benchmark targets:
//! - Cold search over 1,000 files: <50ms
//! - Warm search (discovery and previews cached): <5ms
//! - Decomposition of a multi-step query: <1ms
//!
//! These benchmarks cover:
//! - File discovery and heuristic scoring
//! - Preview reads through the LRU cache
//! - Task decomposition and plan building
//! - Prompt assembly

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::fs;
use std::hint::black_box;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use taskscope::config::{ContextConfig, DecompositionConfig, RetrievalConfig};
use taskscope::models::TaskType;
use taskscope::services::graph_analysis::basic_analysis;
use taskscope::{ContextAssembler, FileRetriever, TaskDecomposer};

// ============================================================================
// Helper Functions
// ============================================================================

const AREAS: &[&str] = &["auth", "api", "db", "ui", "utils", "billing", "search", "jobs"];
const KINDS: &[&str] = &["handler", "service", "model", "controller", "helper"];

/// Writes `count` source files spread over a few feature directories.
fn create_project(count: usize) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for i in 0..count {
        let area = AREAS[i % AREAS.len()];
        let kind = KINDS[(i / AREAS.len()) % KINDS.len()];
        let path = dir.path().join(format!("src/{area}/{area}_{kind}_{i}.ts"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let body: String = (0..40)
            .map(|line| format!("export const {area}{kind}{i}_{line} = {line};\n"))
            .collect();
        fs::write(path, body).unwrap();
    }
    dir
}

fn retriever_with_ttl(ttl: Duration) -> FileRetriever {
    FileRetriever::new(RetrievalConfig::default().with_discovery_ttl(ttl))
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("retrieval_search");
    group.sample_size(20);

    for size in [100_usize, 1_000] {
        let project = create_project(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("cold", size), &project, |b, project| {
            b.iter(|| {
                let retriever = retriever_with_ttl(Duration::ZERO);
                black_box(retriever.search(black_box("fix the login session bug"), project.path()))
            });
        });

        let warm = retriever_with_ttl(Duration::from_secs(600));
        warm.search("warm up", project.path());
        group.bench_with_input(BenchmarkId::new("warm", size), &project, |b, project| {
            b.iter(|| black_box(warm.search(black_box("fix the login session bug"), project.path())));
        });
    }
    group.finish();
}

fn bench_decompose(c: &mut Criterion) {
    let decomposer = TaskDecomposer::new(DecompositionConfig::default());
    let mut group = c.benchmark_group("decompose");

    for (name, query) in [
        ("simple", "fix the login bug"),
        (
            "complex",
            "refactor the AuthService and then add unit tests, also update the config and document the API",
        ),
    ] {
        group.bench_function(name, |b| b.iter(|| black_box(decomposer.decompose(black_box(query)))));
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let project = create_project(200);
    let files = FileRetriever::default().search("auth handler service", project.path());
    let graph = basic_analysis(&files);
    let assembler = ContextAssembler::new(ContextConfig::default());

    c.bench_function("assemble_prompt", |b| {
        b.iter(|| {
            black_box(assembler.build(
                black_box("fix the auth handler"),
                TaskType::Fix,
                &[],
                &files,
                &graph,
            ))
        });
    });
}

fn discovered_count(root: &Path) -> usize {
    FileRetriever::default().discover(root).len()
}

fn bench_discover(c: &mut Criterion) {
    let project = create_project(1_000);
    assert_eq!(discovered_count(project.path()), 1_000);
    c.bench_function("discover_1000", |b| {
        b.iter(|| black_box(discovered_count(black_box(project.path()))));
    });
}

criterion_group!(benches, bench_search, bench_decompose, bench_assemble, bench_discover);
criterion_main!(benches);
