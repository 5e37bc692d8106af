//! Storage engine pipeline (C5) — IOPS/queue-depth limits, pattern
//! optimization, controller cache, TRIM/GC, fragmentation, wear leveling,
//! thermal, compression, encryption, multi-stream and zoned behavior.

pub mod stages;

use crate::base::EngineBase;
use crate::engine::Engine;
use crate::queue_sizing;
use serde::{Deserialize, Serialize};
use sim_common::complexity::{ComplexityLevel, ComplexitySet, EngineKind, feature_set};
use sim_common::error::{SimError, SimResult};
use sim_common::operation::{Operation, OperationResult, PenaltyInformation, ProcessingOperation};
use sim_common::profile::EngineProfile;
use std::collections::BinaryHeap;

/// Thermal accumulator threshold above which `storage_thermal` throttles.
const HEAT_THRESHOLD: f64 = 100.0;
const HEAT_PER_OP: f64 = 2.0;
const COOLING_PER_TICK: f64 = 5.0;

struct StorageState {
    total_slots: u32,
    busy_slots: u32,
    accumulated_heat: f64,
}

impl StorageState {
    fn from_profile(profile: &EngineProfile) -> SimResult<Self> {
        let storage = profile.as_storage().ok_or_else(|| SimError::InvalidProfile {
            path: profile.name.clone(),
            reason: "profile is not a storage profile".to_string(),
        })?;
        Ok(Self { total_slots: storage.queue_behavior.queue_depth.max(1), busy_slots: 0, accumulated_heat: 0.0 })
    }

    fn is_throttled(&self) -> bool {
        self.accumulated_heat > HEAT_THRESHOLD
    }

    fn cool_one_tick(&mut self) {
        self.accumulated_heat = (self.accumulated_heat - COOLING_PER_TICK).max(0.0);
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StorageDynamicState {
    busy_slots: u32,
    accumulated_heat: f64,
    health_score: f64,
    total_operations: u64,
    completed_operations: u64,
    failed_operations: u64,
    in_flight: Vec<ProcessingOperation>,
}

/// The storage engine: IOPS-bound archetype reusing the common engine base
/// with its own domain stages and a simple thermal accumulator.
pub struct StorageEngine {
    base: EngineBase,
    state: Option<StorageState>,
    profile: Option<EngineProfile>,
    complexity_set: ComplexitySet,
    complexity_level: ComplexityLevel,
    in_flight: BinaryHeap<ProcessingOperation>,
    heap_capacity: usize,
    tick_duration_ns: u64,
}

impl StorageEngine {
    pub fn new(tick_duration_ns: u64, variance_seed: u64, pressure_factor: f64) -> Self {
        Self {
            base: EngineBase::new(0, 256, tick_duration_ns, variance_seed, pressure_factor),
            state: None,
            profile: None,
            complexity_set: feature_set(ComplexityLevel::Advanced, EngineKind::Storage),
            complexity_level: ComplexityLevel::Advanced,
            in_flight: BinaryHeap::new(),
            heap_capacity: 64,
            tick_duration_ns,
        }
    }

    fn state_mut(&mut self) -> SimResult<&mut StorageState> {
        self.state.as_mut().ok_or_else(|| SimError::InvalidProfile { path: "<none>".to_string(), reason: "no profile loaded".to_string() })
    }

    fn run_pipeline(&mut self, op: &Operation) -> SimResult<(f64, PenaltyInformation, serde_json::Value)> {
        let profile = self.profile.as_ref().ok_or_else(|| SimError::InvalidProfile { path: "<none>".to_string(), reason: "no profile loaded".to_string() })?;
        let storage = profile.as_storage().expect("profile kind checked at load time");
        let set = &self.complexity_set;
        let state = self.state.as_ref().expect("state present alongside profile");

        let avg_latency_ms = profile.baseline("avg_latency_ms").unwrap_or(1.0);
        let mut t = stages::iops_limits(avg_latency_ms);

        if set.should_enable("queue_depth") {
            t = stages::queue_depth(t, self.in_flight.len(), &storage.queue_behavior);
        }
        if set.should_enable("pattern_optimization") {
            t = stages::pattern_optimization(t, op, &storage.queue_behavior);
        }
        let mut cache_hit = false;
        if set.should_enable("controller_cache") {
            let (t2, hit) = stages::controller_cache(t, op, &storage.controller_cache);
            t = t2;
            cache_hit = hit;
        }
        if set.should_enable("trim_gc") {
            t = stages::trim_gc(t, op, &storage.maintenance);
        }
        if set.should_enable("fragmentation") {
            t = stages::fragmentation(t, &storage.maintenance);
        }
        if set.should_enable("wear_leveling") {
            t = stages::wear_leveling(t, op, &storage.maintenance);
        }
        if set.should_enable("storage_thermal") {
            t = stages::storage_thermal(t, state.is_throttled(), &storage.advanced);
        }
        if set.should_enable("compression") {
            t = stages::compression(t, &storage.advanced);
        }
        if set.should_enable("encryption") {
            t = stages::encryption(t, &storage.advanced);
        }
        if set.should_enable("multi_stream") {
            t = stages::multi_stream(t, op, &storage.advanced);
        }
        if set.should_enable("zoned_storage") {
            t = stages::zoned_storage(t, op, &storage.advanced);
        }

        let utilization = if state.total_slots == 0 { 0.0 } else { state.busy_slots as f64 / state.total_slots as f64 };
        let load_penalty = self.base.load_factor(utilization);
        let queue_penalty = self.base.queue_pressure_factor();
        let health_penalty = self.base.health_penalty_factor();
        let base_after_stages = t;

        if set.should_enable("common_factors") {
            let variance = self.base.variance_factor();
            t *= load_penalty * queue_penalty * health_penalty * variance;
        }

        let penalty_info = PenaltyInformation::build(base_after_stages, t, load_penalty, queue_penalty, 1.0, 1.0, health_penalty, self.base.health.score());

        let mut metrics = serde_json::Map::new();
        metrics.insert("controller_cache_hit".to_string(), serde_json::json!(cache_hit));

        Ok((t.max(0.001), penalty_info, serde_json::Value::Object(metrics)))
    }
}

impl Engine for StorageEngine {
    fn queue_operation(&mut self, op: Operation) -> SimResult<()> {
        self.base.queue.push_back(op)
    }

    fn queue_length(&self) -> usize {
        self.base.queue.len()
    }

    fn capacity(&self) -> usize {
        self.base.queue.capacity()
    }

    fn utilization(&self) -> f64 {
        self.state.as_ref().map(|s| if s.total_slots == 0 { 0.0 } else { s.busy_slots as f64 / s.total_slots as f64 }).unwrap_or(0.0)
    }

    fn health(&self) -> f64 {
        self.base.health.score()
    }

    fn set_complexity_level(&mut self, level: ComplexityLevel) {
        self.complexity_level = level;
        self.complexity_set = feature_set(level, EngineKind::Storage);
        if let Some(profile) = &self.profile {
            self.heap_capacity = queue_sizing::heap_capacity(profile, level, self.tick_duration_ns);
        }
    }

    fn load_profile(&mut self, profile: EngineProfile) -> SimResult<()> {
        if profile.kind != EngineKind::Storage {
            return Err(SimError::InvalidProfile { path: profile.name.clone(), reason: "expected a storage profile".to_string() });
        }
        let state = StorageState::from_profile(&profile)?;
        let queue_cap = queue_sizing::queue_capacity(&profile, self.complexity_level, self.tick_duration_ns);
        let heap_cap = queue_sizing::heap_capacity(&profile, self.complexity_level, self.tick_duration_ns);
        self.base.reset(queue_cap, 256);
        self.heap_capacity = heap_cap;
        self.in_flight.clear();
        self.state = Some(state);
        self.profile = Some(profile);
        Ok(())
    }

    fn process_operation(&mut self, op: &Operation, tick: u64) -> SimResult<OperationResult> {
        let (latency_ms, penalty_info, metrics) = self.run_pipeline(op)?;
        let completion_tick = ProcessingOperation::completion_tick_for(tick, latency_ms, self.tick_duration_ns);

        let mut metrics_map = std::collections::HashMap::new();
        if let serde_json::Value::Object(map) = metrics {
            for (k, v) in map {
                metrics_map.insert(k, v);
            }
        }

        Ok(OperationResult {
            id: op.id.clone(),
            op_type: op.op_type.clone(),
            processing_time_ms: latency_ms,
            completion_tick,
            success: true,
            next_component: op.next_component.clone(),
            penalty_info,
            metrics: metrics_map,
        })
    }

    fn process_tick(&mut self, tick: u64) -> SimResult<Vec<OperationResult>> {
        let mut results = Vec::new();

        while let Some(top) = self.in_flight.peek() {
            if top.completion_tick > tick {
                break;
            }
            let done = self.in_flight.pop().expect("peeked Some");
            if let Some(state) = self.state.as_mut() {
                state.busy_slots = state.busy_slots.saturating_sub(done.resource_units);
            }
            self.base.completed_operations += 1;
            results.push(OperationResult {
                id: done.operation.id.clone(),
                op_type: done.operation.op_type.clone(),
                processing_time_ms: done.latency_ms,
                completion_tick: done.completion_tick,
                success: true,
                next_component: done.operation.next_component.clone(),
                penalty_info: done.penalty_info,
                metrics: std::collections::HashMap::new(),
            });
        }

        let max_admit = {
            let profile = self.profile.as_ref();
            profile.and_then(|p| p.baseline("max_ops_per_tick")).unwrap_or(3.0) as usize
        };

        let mut admitted = 0;
        while admitted < max_admit && self.in_flight.len() < self.heap_capacity {
            let Some(op) = self.base.queue.pop_front() else { break };
            let slots_used = stages::slots_needed(&op);
            let free_slots = {
                let state = match &self.state {
                    Some(s) => s,
                    None => {
                        self.base.queue.push_front(op);
                        break;
                    }
                };
                state.total_slots.saturating_sub(state.busy_slots)
            };
            if slots_used > free_slots {
                self.base.queue.push_front(op);
                break;
            }

            let result = self.process_operation(&op, tick)?;
            let sequence = self.base.next_sequence();
            if let Some(state) = self.state.as_mut() {
                state.busy_slots += slots_used;
                state.accumulated_heat += HEAT_PER_OP;
            }
            self.base.total_operations += 1;
            self.in_flight.push(ProcessingOperation {
                operation: op,
                start_tick: tick,
                completion_tick: result.completion_tick,
                resource_units: slots_used,
                sequence,
                latency_ms: result.processing_time_ms,
                penalty_info: result.penalty_info,
            });
            admitted += 1;
        }

        if let Some(state) = self.state.as_mut() {
            state.cool_one_tick();
        }
        let utilization = self.utilization();
        self.base.health.update(utilization);

        Ok(results)
    }

    fn get_dynamic_state(&self) -> serde_json::Value {
        let Some(state) = &self.state else {
            return serde_json::Value::Null;
        };
        let snapshot = StorageDynamicState {
            busy_slots: state.busy_slots,
            accumulated_heat: state.accumulated_heat,
            health_score: self.base.health.score(),
            total_operations: self.base.total_operations,
            completed_operations: self.base.completed_operations,
            failed_operations: self.base.failed_operations,
            in_flight: self.in_flight.clone().into_sorted_vec(),
        };
        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
    }

    fn load_dynamic_state(&mut self, state: serde_json::Value) -> SimResult<()> {
        if state.is_null() {
            return Ok(());
        }
        let snapshot: StorageDynamicState = serde_json::from_value(state)?;
        let storage_state = self.state_mut()?;
        storage_state.busy_slots = snapshot.busy_slots;
        storage_state.accumulated_heat = snapshot.accumulated_heat;
        self.base.total_operations = snapshot.total_operations;
        self.base.completed_operations = snapshot.completed_operations;
        self.base.failed_operations = snapshot.failed_operations;
        self.in_flight = snapshot.in_flight.into_iter().collect();
        Ok(())
    }

    fn reset(&mut self) {
        let queue_cap = self.base.queue.capacity();
        self.base.reset(queue_cap, 256);
        self.in_flight.clear();
        if let Some(profile) = self.profile.clone() {
            if let Ok(state) = StorageState::from_profile(&profile) {
                self.state = Some(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_common::operation::{ComplexityClass, Language, OperationType};
    use std::collections::HashMap;

    fn samsung_profile() -> EngineProfile {
        let content = include_str!("../../../sim_common/src/profile/defaults/storage_samsung_980_pro.json");
        let doc: sim_common::profile::ProfileDocument = serde_json::from_str(content).unwrap();
        EngineProfile::parse("samsung_980_pro", doc, EngineKind::Storage).unwrap()
    }

    fn op(id: &str, op_type: OperationType) -> Operation {
        Operation { id: id.into(), op_type, complexity: ComplexityClass::O1, language: Language::Rust, data_size: 4096, next_component: None, metadata: HashMap::new() }
    }

    #[test]
    fn process_operation_returns_positive_latency() {
        let mut engine = StorageEngine::new(10_000, 5, 0.3);
        engine.load_profile(samsung_profile()).unwrap();
        let result = engine.process_operation(&op("r1", OperationType::StorageRead), 0).unwrap();
        assert!(result.processing_time_ms > 0.0);
    }

    #[test]
    fn utilization_never_exceeds_one() {
        let mut engine = StorageEngine::new(10_000, 6, 0.3);
        engine.load_profile(samsung_profile()).unwrap();
        for i in 0..200 {
            let _ = engine.queue_operation(op(&format!("w-{i}"), OperationType::StorageWrite));
        }
        for tick in 0..100 {
            let _ = engine.process_tick(tick);
            assert!(engine.utilization() <= 1.0);
        }
    }

    #[test]
    fn reset_clears_accumulated_heat_and_queue() {
        let mut engine = StorageEngine::new(10_000, 7, 0.3);
        engine.load_profile(samsung_profile()).unwrap();
        let _ = engine.queue_operation(op("a", OperationType::StorageRead));
        engine.reset();
        assert_eq!(engine.queue_length(), 0);
        assert_eq!(engine.health(), 1.0);
    }
}
