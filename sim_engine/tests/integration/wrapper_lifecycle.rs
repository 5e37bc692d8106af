//! Cross-cutting wrapper scenarios that exercise pause/resume and
//! snapshot/restore across many ticks, against the wrapper's public API.

use sim_common::complexity::EngineKind;
use sim_common::config::SimConfig;
use sim_common::operation::{ComplexityClass, Language, Operation, OperationType};
use sim_common::profile::{EngineProfile, ProfileDocument};
use sim_engine::cpu::CpuEngine;
use sim_engine::engine::Engine;
use sim_engine::wrapper::{self, RoutingTable, WrapperHandle, DRAIN};
use std::collections::HashMap;

fn xeon_profile() -> EngineProfile {
    let content = include_str!("../../../sim_common/src/profile/defaults/cpu_intel_xeon_6248r.json");
    let doc: ProfileDocument = serde_json::from_str(content).unwrap();
    EngineProfile::parse("xeon", doc, EngineKind::Cpu).unwrap()
}

fn op(id: &str) -> Operation {
    Operation {
        id: id.to_string(),
        op_type: OperationType::Compute,
        complexity: ComplexityClass::O1,
        language: Language::Go,
        data_size: 100,
        next_component: None,
        metadata: HashMap::new(),
    }
}

fn make_wrapper() -> (WrapperHandle, tokio::task::JoinHandle<()>) {
    let mut engine = CpuEngine::new(10_000, 0, 0.3);
    engine.load_profile(xeon_profile()).unwrap();
    let config = SimConfig::default();
    let mut routing = RoutingTable::default();
    routing.set("compute", DRAIN);
    wrapper::spawn("cpu-0".to_string(), EngineKind::Cpu, "xeon_6248r".to_string(), engine, &config, 64, routing, None)
}

/// S5: pausing stops admission and execution, resuming picks back up
/// without losing or duplicating any queued operation.
#[tokio::test]
async fn pause_then_resume_drains_without_loss() {
    let (handle, _join) = make_wrapper();
    for i in 0..5 {
        handle.queue_operation(op(&format!("p{i}"))).unwrap();
    }
    let mut retired = 0;
    for t in 1..=5u64 {
        retired += handle.process_tick(t).await.unwrap().len();
    }
    handle.pause().await.unwrap();
    for t in 6..=15u64 {
        let r = handle.process_tick(t).await.unwrap();
        assert!(r.is_empty());
    }
    handle.resume().await.unwrap();
    for t in 16..=40u64 {
        retired += handle.process_tick(t).await.unwrap().len();
    }
    assert_eq!(retired, 5);
}

/// S6: a snapshot taken from one wrapper, restored into a freshly spawned
/// wrapper, reproduces the same tick and inbox contents.
#[tokio::test]
async fn snapshot_round_trip_preserves_tick_and_inbox() {
    let (handle, _join) = make_wrapper();
    handle.queue_operation(op("x")).unwrap();
    handle.process_tick(1).await.unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.current_tick, 1);

    let (handle2, _join2) = make_wrapper();
    handle2.restore(snap.clone()).await.unwrap();
    let snap2 = handle2.snapshot().await.unwrap();
    assert_eq!(snap2.current_tick, snap.current_tick);
    assert_eq!(snap2.input_queue_operations.len(), snap.input_queue_operations.len());
}
