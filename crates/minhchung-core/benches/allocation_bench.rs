//! # Allocation Benchmarks
//!
//! Throughput of the registry's hot paths.
//!
//! Run with: `cargo bench -p minhchung-core`

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use minhchung_core::{
    CriterionId, DepartmentId, EvidenceFilter, ManualClock, NewEvidenceCode, PageRequest,
    Registry, UserId, export_snapshot,
};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

fn registry() -> (TempDir, Registry) {
    let temp = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 1, 3, 0, 0)
            .single()
            .expect("timestamp"),
    ));
    let registry = Registry::open(temp.path().join("bench.redb"), clock).expect("open");
    registry.create_department("CNTT", "CNTT").expect("department");
    registry.create_criterion("1.1", "1.1", None).expect("criterion");
    (temp, registry)
}

fn request() -> NewEvidenceCode {
    NewEvidenceCode {
        department_id: DepartmentId(1),
        criterion_id: CriterionId(1),
        description: Some("Biên bản họp".to_string()),
        created_by: UserId(1),
    }
}

/// Registry with `size` codes already issued.
fn filled(size: usize) -> (TempDir, Registry) {
    let (temp, registry) = registry();
    for _ in 0..size {
        registry.generate(&request()).expect("generate");
    }
    (temp, registry)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_generate(c: &mut Criterion) {
    let (_temp, registry) = registry();
    c.bench_function("generate", |b| {
        b.iter(|| black_box(registry.generate(&request()).expect("generate")));
    });
}

fn bench_lookup_by_code(c: &mut Criterion) {
    let (_temp, registry) = filled(1000);
    let code = registry
        .list(&EvidenceFilter::default(), PageRequest::default())
        .expect("list")
        .items
        .first()
        .map(|e| e.code.clone())
        .expect("code");
    c.bench_function("get_by_code", |b| {
        b.iter(|| black_box(registry.get_by_code(&code).expect("lookup")));
    });
}

fn bench_list_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_search");

    for size in [100, 1000, 5000].iter() {
        let (_temp, registry) = filled(*size);
        let filter = EvidenceFilter {
            search: Some("họp".to_string()),
            ..EvidenceFilter::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(registry.list(&filter, PageRequest::default()).expect("list")));
        });
    }

    group.finish();
}

fn bench_export_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_snapshot");

    for size in [100, 1000].iter() {
        let (_temp, registry) = filled(*size);
        let snapshot = registry.store().snapshot().expect("snapshot");
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(export_snapshot(&snapshot).expect("export")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_generate,
    bench_lookup_by_code,
    bench_list_search,
    bench_export_snapshot,
);

criterion_main!(benches);
