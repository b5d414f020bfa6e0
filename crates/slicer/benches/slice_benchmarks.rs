//! Benchmarks for slice parsing, block planning and in-memory reads.
//!
//! Run with: cargo bench --package slicer --bench slice_benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

use adapters::{Adapter, ArrayAdapter, Node};
use slicer::{plan_blocks, BackendPool, SliceEngine, SliceSpec};
use test_utils::ramp_array;
use tree_common::{ArrayStructure, DType, NodePath, Structure};

// =============================================================================
// SELECTOR PARSING BENCHMARKS
// =============================================================================

fn bench_selector_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_parsing");

    group.bench_function("parse_range_2d", |b| {
        b.iter(|| SliceSpec::parse(black_box("200:300, :")))
    });

    group.bench_function("parse_mixed", |b| {
        b.iter(|| SliceSpec::parse(black_box("-1, 3:17:4, [9, 0, 4]")))
    });

    group.finish();
}

// =============================================================================
// BLOCK PLANNING BENCHMARKS
// =============================================================================

fn bench_block_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_planning");
    let structure =
        ArrayStructure::new(vec![10_000, 1_000], vec![100, 100], DType::f64()).unwrap();
    let wrapped = Structure::Array(structure.clone());

    for expr in ["200:300, :", "::7, ::13", ":"] {
        let slice = SliceSpec::parse(expr).unwrap().resolve(&wrapped).unwrap();
        group.bench_function(expr, |b| b.iter(|| plan_blocks(&structure, black_box(&slice))));
    }

    group.finish();
}

// =============================================================================
// ARRAY READ BENCHMARKS
// =============================================================================

fn bench_array_reads(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let adapter: Arc<dyn Adapter> =
        Arc::new(ArrayAdapter::new(ramp_array(vec![1000, 500]), Some(vec![100, 100])).unwrap());
    let node = runtime
        .block_on(Node::load(NodePath::parse("bench/ramp"), adapter))
        .unwrap();
    let engine = SliceEngine::new(BackendPool::default(), 16);

    let mut group = c.benchmark_group("array_reads");
    for (name, expr, elements) in [
        ("single_block", "200:300, 0:100", 100 * 100),
        ("straddling", "150:450, 50:250", 300 * 200),
        ("strided", "::10, ::10", 100 * 50),
    ] {
        let spec = SliceSpec::parse(expr).unwrap();
        group.throughput(Throughput::Elements(elements));
        group.bench_function(name, |b| {
            b.iter(|| runtime.block_on(engine.read_slice(&node, black_box(&spec))))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_selector_parsing,
    bench_block_planning,
    bench_array_reads,
);

criterion_main!(benches);
