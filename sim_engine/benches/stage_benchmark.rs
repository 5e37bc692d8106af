//! Stage benchmark — measures the CPU pipeline's per-operation cost across
//! complexity levels, and the wrapper's single-tick overhead.
//!
//! Mirrors the CPU engine's staged-transform design: benchmarking
//! `process_operation` directly exercises every enabled stage (§4.4)
//! without the queue/heap admission machinery, the way a per-stage
//! microbenchmark is meant to (§9: "enables per-stage microbenchmarks").

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use sim_common::complexity::ComplexityLevel;
use sim_common::operation::{ComplexityClass, Language, Operation, OperationType};
use sim_common::profile::{EngineProfile, ProfileDocument};
use sim_engine::cpu::CpuEngine;
use sim_engine::engine::Engine;
use std::collections::HashMap;

fn xeon_profile() -> EngineProfile {
    let content = include_str!("../../sim_common/src/profile/defaults/cpu_intel_xeon_6248r.json");
    let doc: ProfileDocument = serde_json::from_str(content).unwrap();
    EngineProfile::parse("xeon", doc, sim_common::complexity::EngineKind::Cpu).unwrap()
}

fn compute_op(id: &str) -> Operation {
    Operation {
        id: id.to_string(),
        op_type: OperationType::Compute,
        complexity: ComplexityClass::ONLogN,
        language: Language::Rust,
        data_size: 65_536,
        next_component: None,
        metadata: HashMap::new(),
    }
}

fn bench_cpu_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_pipeline");

    for level in ComplexityLevel::all() {
        let mut engine = CpuEngine::new(10_000, 42, 0.3);
        engine.set_complexity_level(level);
        engine.load_profile(xeon_profile()).unwrap();
        let op = compute_op("bench");

        group.bench_with_input(BenchmarkId::new("process_operation", format!("{level:?}")), &level, |b, _| {
            b.iter(|| engine.process_operation(&op, 0).unwrap());
        });
    }

    group.finish();
}

fn bench_tick_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_tick");

    let mut engine = CpuEngine::new(10_000, 42, 0.3);
    engine.set_complexity_level(ComplexityLevel::Advanced);
    engine.load_profile(xeon_profile()).unwrap();
    for i in 0..32 {
        engine.queue_operation(compute_op(&format!("seed-{i}"))).unwrap();
    }

    let mut tick = 0u64;
    group.bench_function("process_tick", |b| {
        b.iter(|| {
            tick += 1;
            let _ = engine.queue_operation(compute_op(&format!("refill-{tick}")));
            engine.process_tick(tick).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_cpu_pipeline, bench_tick_admission);
criterion_main!(benches);
