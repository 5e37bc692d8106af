//! Memory engine pipeline (C5) — DDR timing, bank conflicts, memory
//! ordering/barriers, ECC, power states and TLB/page-walk, following the
//! same staged-pipeline shape as the CPU engine (C4).

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

struct MemoryState {
    total_channels: u32,
    busy_channels: u32,
}

impl MemoryState {
    fn from_profile(profile: &EngineProfile) -> SimResult<Self> {
        let memory = profile.as_memory().ok_or_else(|| SimError::InvalidProfile {
            path: profile.name.clone(),
            reason: "profile is not a memory profile".to_string(),
        })?;
        Ok(Self { total_channels: memory.controller_behavior.channels.max(1), busy_channels: 0 })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MemoryDynamicState {
    busy_channels: u32,
    health_score: f64,
    total_operations: u64,
    completed_operations: u64,
    failed_operations: u64,
    in_flight: Vec<ProcessingOperation>,
}

/// The memory engine: DDR-timing archetype reusing CPU's engine-base
/// bookkeeping (queue, health, variance) with its own domain stages.
pub struct MemoryEngine {
    base: EngineBase,
    state: Option<MemoryState>,
    profile: Option<EngineProfile>,
    complexity_set: ComplexitySet,
    complexity_level: ComplexityLevel,
    in_flight: BinaryHeap<ProcessingOperation>,
    heap_capacity: usize,
    tick_duration_ns: u64,
}

impl MemoryEngine {
    pub fn new(tick_duration_ns: u64, variance_seed: u64, pressure_factor: f64) -> Self {
        Self {
            base: EngineBase::new(0, 256, tick_duration_ns, variance_seed, pressure_factor),
            state: None,
            profile: None,
            complexity_set: feature_set(ComplexityLevel::Advanced, EngineKind::Memory),
            complexity_level: ComplexityLevel::Advanced,
            in_flight: BinaryHeap::new(),
            heap_capacity: 64,
            tick_duration_ns,
        }
    }

    fn state_mut(&mut self) -> SimResult<&mut MemoryState> {
        self.state.as_mut().ok_or_else(|| SimError::InvalidProfile { path: "<none>".to_string(), reason: "no profile loaded".to_string() })
    }

    fn run_pipeline(&mut self, op: &Operation, was_idle: bool) -> SimResult<(f64, PenaltyInformation, serde_json::Value)> {
        let profile = self.profile.as_ref().ok_or_else(|| SimError::InvalidProfile { path: "<none>".to_string(), reason: "no profile loaded".to_string() })?;
        let memory = profile.as_memory().expect("profile kind checked at load time");
        let set = &self.complexity_set;

        let access_time_ns = profile.baseline("access_time").unwrap_or(10.0);
        let log_factor = profile.baseline("complexity_log_factor").unwrap_or(0.2);
        let max_factor = profile.baseline("complexity_max_factor").unwrap_or(3.0);

        let mut t = stages::ddr_timing(access_time_ns);
        if set.should_enable("complexity_scaling") {
            t = crate::cpu::stages::complexity_scaling(t, op, log_factor, max_factor);
        }
        if set.should_enable("bank_conflicts") {
            t = stages::bank_conflicts(t, op, &memory.controller_behavior);
        }
        if set.should_enable("memory_ordering") {
            t = stages::memory_ordering(t, op, &memory.memory_ordering);
        }
        if set.should_enable("memory_barrier_stalls") {
            t = stages::memory_barrier_stalls(t, op, &memory.memory_ordering);
        }
        if set.should_enable("virtual_memory") {
            t = stages::virtual_memory(t, &memory.virtual_memory);
        }
        let mut tlb_miss = false;
        if set.should_enable("tlb_page_walk") {
            let (t2, miss) = stages::tlb_page_walk(t, op, &memory.virtual_memory);
            t = t2;
            tlb_miss = miss;
        }
        if set.should_enable("ecc") {
            t = stages::ecc(t, &memory.ecc_behavior);
        }
        if set.should_enable("power_states") {
            t = stages::power_states(t, was_idle, &memory.power_behavior);
        }

        let state = self.state.as_ref().expect("state present alongside profile");
        let utilization = if state.total_channels == 0 { 0.0 } else { state.busy_channels as f64 / state.total_channels as f64 };
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
        metrics.insert("tlb_miss".to_string(), serde_json::json!(tlb_miss));
        metrics.insert("ordering_model".to_string(), serde_json::json!(memory.memory_ordering.ordering_model));

        Ok((t.max(0.001), penalty_info, serde_json::Value::Object(metrics)))
    }
}

impl Engine for MemoryEngine {
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
        self.state.as_ref().map(|s| if s.total_channels == 0 { 0.0 } else { s.busy_channels as f64 / s.total_channels as f64 }).unwrap_or(0.0)
    }

    fn health(&self) -> f64 {
        self.base.health.score()
    }

    fn set_complexity_level(&mut self, level: ComplexityLevel) {
        self.complexity_level = level;
        self.complexity_set = feature_set(level, EngineKind::Memory);
        if let Some(profile) = &self.profile {
            self.heap_capacity = queue_sizing::heap_capacity(profile, level, self.tick_duration_ns);
        }
    }

    fn load_profile(&mut self, profile: EngineProfile) -> SimResult<()> {
        if profile.kind != EngineKind::Memory {
            return Err(SimError::InvalidProfile { path: profile.name.clone(), reason: "expected a memory profile".to_string() });
        }
        let state = MemoryState::from_profile(&profile)?;
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
        let was_idle = self.state_mut()?.busy_channels == 0;
        let (latency_ms, penalty_info, metrics) = self.run_pipeline(op, was_idle)?;
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
                state.busy_channels = state.busy_channels.saturating_sub(done.resource_units);
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
            let channels_used = stages::channels_needed(&op);
            let free_channels = {
                let state = match &self.state {
                    Some(s) => s,
                    None => {
                        self.base.queue.push_front(op);
                        break;
                    }
                };
                state.total_channels.saturating_sub(state.busy_channels)
            };
            if channels_used > free_channels {
                self.base.queue.push_front(op);
                break;
            }

            let result = self.process_operation(&op, tick)?;
            let sequence = self.base.next_sequence();
            if let Some(state) = self.state.as_mut() {
                state.busy_channels += channels_used;
            }
            self.base.total_operations += 1;
            self.in_flight.push(ProcessingOperation {
                operation: op,
                start_tick: tick,
                completion_tick: result.completion_tick,
                resource_units: channels_used,
                sequence,
                latency_ms: result.processing_time_ms,
                penalty_info: result.penalty_info,
            });
            admitted += 1;
        }

        let utilization = self.utilization();
        self.base.health.update(utilization);

        Ok(results)
    }

    fn get_dynamic_state(&self) -> serde_json::Value {
        let Some(state) = &self.state else {
            return serde_json::Value::Null;
        };
        let snapshot = MemoryDynamicState {
            busy_channels: state.busy_channels,
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
        let snapshot: MemoryDynamicState = serde_json::from_value(state)?;
        let mem_state = self.state_mut()?;
        mem_state.busy_channels = snapshot.busy_channels;
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
            if let Ok(state) = MemoryState::from_profile(&profile) {
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

    fn ddr5_profile() -> EngineProfile {
        let content = include_str!("../../../sim_common/src/profile/defaults/memory_ddr5_6400_server.json");
        let doc: sim_common::profile::ProfileDocument = serde_json::from_str(content).unwrap();
        EngineProfile::parse("ddr5_6400_server", doc, EngineKind::Memory).unwrap()
    }

    fn op(id: &str, op_type: OperationType) -> Operation {
        Operation { id: id.into(), op_type, complexity: ComplexityClass::O1, language: Language::Rust, data_size: 64, next_component: None, metadata: HashMap::new() }
    }

    /// Scenario S4: loading `ddr5_6400_server` exposes the expected ordering fields.
    #[test]
    fn scenario_s4_memory_ordering_fields_from_profile() {
        let profile = ddr5_profile();
        let memory = profile.as_memory().unwrap();
        assert_eq!(memory.memory_ordering.ordering_model, "weak");
        assert_eq!(memory.memory_ordering.reordering_window, 16);
        assert_eq!(memory.memory_ordering.memory_barrier_cost, 15.0);
        assert!(memory.memory_ordering.load_store_reordering);
    }

    #[test]
    fn memory_barrier_occupies_no_channel() {
        let mut engine = MemoryEngine::new(10_000, 1, 0.3);
        engine.load_profile(ddr5_profile()).unwrap();
        let result = engine.process_operation(&op("b1", OperationType::MemoryBarrier), 0).unwrap();
        assert!(result.processing_time_ms > 0.0);
    }

    #[test]
    fn queue_overflow_rejects_past_capacity() {
        let mut engine = MemoryEngine::new(10_000, 1, 0.3);
        engine.load_profile(ddr5_profile()).unwrap();
        let capacity = engine.capacity();
        let mut failures = 0;
        for i in 0..capacity + 5 {
            if engine.queue_operation(op(&format!("m-{i}"), OperationType::MemoryRead)).is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 5);
    }

    #[test]
    fn reset_returns_to_full_health_and_empty_queue() {
        let mut engine = MemoryEngine::new(10_000, 2, 0.3);
        engine.load_profile(ddr5_profile()).unwrap();
        let _ = engine.queue_operation(op("a", OperationType::MemoryRead));
        engine.reset();
        assert_eq!(engine.queue_length(), 0);
        assert_eq!(engine.health(), 1.0);
    }
}
