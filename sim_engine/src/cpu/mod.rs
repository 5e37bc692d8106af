//! CPU engine pipeline (C4) — the archetype staged pipeline that memory,
//! storage and network engines (C5) follow the same pattern as.

pub mod cache;
pub mod cores;
pub mod stages;

use crate::base::EngineBase;
use crate::engine::Engine;
use crate::queue_sizing;
use cache::CacheState;
use serde::{Deserialize, Serialize};
use sim_common::complexity::{ComplexityLevel, ComplexitySet, EngineKind, feature_set};
use sim_common::error::{SimError, SimResult};
use sim_common::operation::{Operation, OperationResult, PenaltyInformation, ProcessingOperation};
use sim_common::profile::EngineProfile;
use stages::BoostState;
use std::collections::BinaryHeap;

/// CPU-specific mutable state beyond the common engine base.
struct CpuState {
    cache: CacheState,
    boost: BoostState,
    temperature_c: f64,
    ambient_c: f64,
    thermal_limit_c: f64,
    throttle_floor: f64,
    heat_capacity: f64,
    cooling_rate: f64,
    total_cores: u32,
    busy_cores: u32,
}

impl CpuState {
    fn from_profile(profile: &EngineProfile) -> SimResult<Self> {
        let cpu = profile.as_cpu().ok_or_else(|| SimError::InvalidProfile {
            path: profile.name.clone(),
            reason: "profile is not a CPU profile".to_string(),
        })?;
        let total_cores = profile.baseline("cores").unwrap_or(1.0).max(1.0) as u32;
        let base_clock = profile.baseline("base_clock").unwrap_or(1.0);
        Ok(Self {
            cache: CacheState::from_profile(&cpu.cache_behavior),
            boost: BoostState::new(base_clock),
            temperature_c: cpu.thermal_behavior.ambient_c,
            ambient_c: cpu.thermal_behavior.ambient_c,
            thermal_limit_c: cpu.thermal_behavior.thermal_limit_c,
            throttle_floor: cpu.thermal_behavior.throttle_floor,
            heat_capacity: cpu.thermal_behavior.heat_capacity,
            cooling_rate: cpu.thermal_behavior.cooling_rate,
            total_cores,
            busy_cores: 0,
        })
    }

    fn cool_one_tick(&mut self) {
        self.temperature_c = (self.temperature_c - self.cooling_rate * (self.temperature_c - self.ambient_c)).max(self.ambient_c);
    }
}

/// Serializable snapshot of `CpuState` for `get_dynamic_state`/`load_dynamic_state`.
#[derive(Debug, Serialize, Deserialize)]
struct CpuDynamicState {
    cache_current_ratios: Vec<(String, f64)>,
    cache_working_set_kb: f64,
    cache_operations_seen: u32,
    boost_current_clock_ghz: f64,
    boost_ticks_remaining: u64,
    temperature_c: f64,
    busy_cores: u32,
    health_score: f64,
    total_operations: u64,
    completed_operations: u64,
    failed_operations: u64,
    in_flight: Vec<ProcessingOperation>,
}

/// The CPU engine: thirteen staged transforms (§4.4) over a min-heap of
/// in-flight operations, gated by complexity feature flags (§4.2).
pub struct CpuEngine {
    base: EngineBase,
    state: Option<CpuState>,
    profile: Option<EngineProfile>,
    complexity_set: ComplexitySet,
    complexity_level: ComplexityLevel,
    in_flight: BinaryHeap<ProcessingOperation>,
    heap_capacity: usize,
    tick_duration_ns: u64,
}

impl CpuEngine {
    pub fn new(tick_duration_ns: u64, variance_seed: u64, pressure_factor: f64) -> Self {
        Self {
            base: EngineBase::new(0, 256, tick_duration_ns, variance_seed, pressure_factor),
            state: None,
            profile: None,
            complexity_set: feature_set(ComplexityLevel::Advanced, EngineKind::Cpu),
            complexity_level: ComplexityLevel::Advanced,
            in_flight: BinaryHeap::new(),
            heap_capacity: 64,
            tick_duration_ns,
        }
    }

    fn state_mut(&mut self) -> SimResult<&mut CpuState> {
        self.state.as_mut().ok_or_else(|| SimError::InvalidProfile {
            path: "<none>".to_string(),
            reason: "no profile loaded".to_string(),
        })
    }

    /// Run the full staged pipeline for one operation, without mutating
    /// queue/heap bookkeeping (that's `process_tick`'s job).
    fn run_pipeline(&mut self, op: &Operation, cores_used: u32) -> SimResult<(f64, PenaltyInformation, serde_json::Value)> {
        let profile = self.profile.as_ref().ok_or_else(|| SimError::InvalidProfile {
            path: "<none>".to_string(),
            reason: "no profile loaded".to_string(),
        })?;
        let cpu = profile.as_cpu().expect("profile kind checked at load time");
        let set = &self.complexity_set;
        let state = self.state.as_mut().expect("state present alongside profile");

        let base_clock = profile.baseline("base_clock").unwrap_or(1.0);
        let clock_baseline = profile.baseline("clock_normalization_baseline").unwrap_or(base_clock);
        let log_factor = profile.baseline("complexity_log_factor").unwrap_or(0.35);
        let max_factor = profile.baseline("complexity_max_factor").unwrap_or(6.0);

        let mut t = stages::base_latency_ms(
            profile.baseline("base_processing_time").unwrap_or(1.0),
            clock_baseline,
            base_clock,
        );

        if set.should_enable("language_multiplier") {
            t = stages::language_multiplier(t, op, &cpu.language_performance);
        }
        if set.should_enable("complexity_scaling") {
            t = stages::complexity_scaling(t, op, log_factor, max_factor);
        }
        if set.should_enable("vectorization") {
            t = stages::vectorization(t, op, &cpu.vectorization);
        }

        let mut cache_level = None;
        if set.should_enable("cache_hierarchy") {
            match state.cache.determine_hit(op) {
                Some(level) => {
                    let multiplier = state
                        .cache
                        .levels
                        .iter()
                        .find(|l| l.name == level)
                        .map(|l| l.multiplier)
                        .unwrap_or(1.0);
                    t *= multiplier;
                    cache_level = Some(level);
                }
                None => {
                    t *= state.cache.memory_multiplier;
                    cache_level = Some("memory".to_string());
                }
            }
        }

        let pattern = stages::classify_access_pattern(op);
        if set.should_enable("advanced_prefetch") {
            t = stages::advanced_prefetch(t, op, &cpu.hardware_prefetch, pattern);
        }

        let mut branch_miss = false;
        if set.should_enable("branch_prediction") {
            let (t2, miss) = stages::branch_prediction(t, op, &cpu.branch_prediction);
            t = t2;
            branch_miss = miss;
        }

        let mut numa_local = true;
        if set.should_enable("numa") {
            let (t2, local) = stages::numa(t, op, &cpu.numa_behavior);
            t = t2;
            numa_local = local;
        }

        if set.should_enable("boost_clocks") {
            t = stages::boost_clocks(
                t,
                state.busy_cores + cores_used,
                state.total_cores,
                base_clock,
                &cpu.boost_behavior,
                &mut state.boost,
                state.temperature_c,
                state.thermal_limit_c,
                state.throttle_floor,
            );
        }

        if set.should_enable("bandwidth_contention") {
            let memory_intensity = if matches!(op.op_type, sim_common::operation::OperationType::MemoryRead | sim_common::operation::OperationType::MemoryWrite) {
                0.8
            } else {
                0.3
            };
            t = stages::bandwidth_contention(t, cores_used, &cpu.memory_bandwidth.contention_curve, memory_intensity);
        }

        let throttle_factor = stages::throttle_factor_for(state.temperature_c, state.thermal_limit_c, state.throttle_floor);
        if set.should_enable("thermal_throttling") {
            t = stages::thermal_throttling(t, state.temperature_c, state.thermal_limit_c, throttle_factor);
        }

        let utilization = if state.total_cores == 0 { 0.0 } else { state.busy_cores as f64 / state.total_cores as f64 };
        let load_penalty = self.base.load_factor(utilization);
        let queue_penalty = self.base.queue_pressure_factor();
        let health_penalty = self.base.health_penalty_factor();
        let thermal_penalty = 1.0 / throttle_factor;
        let contention_penalty = if set.should_enable("bandwidth_contention") { 1.05 } else { 1.0 };
        let base_after_stages = t;

        if set.should_enable("common_factors") {
            let variance = self.base.variance_factor();
            t *= load_penalty * queue_penalty * health_penalty * variance;
        }

        let heat = stages::heat_generated(utilization, op.complexity.weight(), t, state.heat_capacity);
        state.temperature_c = (state.temperature_c + heat).max(state.ambient_c);

        let penalty_info = PenaltyInformation::build(
            base_after_stages,
            t,
            load_penalty,
            queue_penalty,
            thermal_penalty,
            contention_penalty,
            health_penalty,
            self.base.health.score(),
        );

        let mut metrics = serde_json::Map::new();
        if let Some(level) = &cache_level {
            metrics.insert("cache_level".to_string(), serde_json::Value::String(level.clone()));
        }
        metrics.insert("cores_used".to_string(), serde_json::json!(cores_used));
        metrics.insert("branch_misprediction".to_string(), serde_json::json!(branch_miss));
        metrics.insert("numa_local".to_string(), serde_json::json!(numa_local));
        metrics.insert("access_pattern".to_string(), serde_json::json!(pattern.as_str()));
        metrics.insert("boost_clock_ghz".to_string(), serde_json::json!(state.boost.current_clock_ghz));
        metrics.insert("temperature_c".to_string(), serde_json::json!(state.temperature_c));

        Ok((t.max(0.001), penalty_info, serde_json::Value::Object(metrics)))
    }

}

impl Engine for CpuEngine {
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
        self.state.as_ref().map(|s| if s.total_cores == 0 { 0.0 } else { s.busy_cores as f64 / s.total_cores as f64 }).unwrap_or(0.0)
    }

    fn health(&self) -> f64 {
        self.base.health.score()
    }

    fn set_complexity_level(&mut self, level: ComplexityLevel) {
        self.complexity_level = level;
        self.complexity_set = feature_set(level, EngineKind::Cpu);
        if let Some(profile) = &self.profile {
            self.heap_capacity = queue_sizing::heap_capacity(profile, level, self.tick_duration_ns);
        }
    }

    fn load_profile(&mut self, profile: EngineProfile) -> SimResult<()> {
        if profile.kind != EngineKind::Cpu {
            return Err(SimError::InvalidProfile { path: profile.name.clone(), reason: "expected a cpu profile".to_string() });
        }
        let state = CpuState::from_profile(&profile)?;
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
        let total_cores = self.state_mut()?.total_cores;
        let profile = self.profile.clone().ok_or_else(|| SimError::InvalidProfile {
            path: "<none>".to_string(),
            reason: "no profile loaded".to_string(),
        })?;
        let cpu = profile.as_cpu().expect("checked at load time");
        let cores_used = cores::cores_needed(op, total_cores, &cpu.parallel_processing);
        let (latency_ms, penalty_info, metrics) = self.run_pipeline(op, cores_used)?;
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
                state.busy_cores = state.busy_cores.saturating_sub(done.resource_units);
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
            let total_cores = match &self.state {
                Some(s) => s.total_cores,
                None => break,
            };
            let cores_used = {
                let profile = self.profile.as_ref().expect("state implies profile");
                let cpu = profile.as_cpu().expect("checked at load time");
                cores::cores_needed(&op, total_cores, &cpu.parallel_processing)
            };
            let free_cores = {
                let state = self.state.as_ref().expect("checked above");
                state.total_cores.saturating_sub(state.busy_cores)
            };
            if cores_used > free_cores {
                self.base.queue.push_front(op);
                break;
            }

            let result = self.process_operation(&op, tick)?;
            let sequence = self.base.next_sequence();
            if let Some(state) = self.state.as_mut() {
                state.busy_cores += cores_used;
            }
            self.base.total_operations += 1;
            self.in_flight.push(ProcessingOperation {
                operation: op,
                start_tick: tick,
                completion_tick: result.completion_tick,
                resource_units: cores_used,
                sequence,
                latency_ms: result.processing_time_ms,
                penalty_info: result.penalty_info,
            });
            admitted += 1;
        }

        if let Some(state) = self.state.as_mut() {
            state.cool_one_tick();
            if let Some(profile) = &self.profile {
                if let Some(cpu) = profile.as_cpu() {
                    state.boost.decay_one_tick(profile.baseline("base_clock").unwrap_or(1.0), cpu.boost_behavior.ramp_down_pct_per_tick);
                }
            }
        }
        let utilization = self.utilization();
        self.base.health.update(utilization);

        Ok(results)
    }

    fn get_dynamic_state(&self) -> serde_json::Value {
        let Some(state) = &self.state else {
            return serde_json::Value::Null;
        };
        let snapshot = CpuDynamicState {
            cache_current_ratios: state.cache.levels.iter().map(|l| (l.name.clone(), l.current_hit_ratio)).collect(),
            cache_working_set_kb: state.cache.working_set_kb,
            cache_operations_seen: state.cache.operations_seen,
            boost_current_clock_ghz: state.boost.current_clock_ghz,
            boost_ticks_remaining: state.boost.ticks_remaining,
            temperature_c: state.temperature_c,
            busy_cores: state.busy_cores,
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
        let snapshot: CpuDynamicState = serde_json::from_value(state)?;
        let cpu_state = self.state_mut()?;
        for (name, ratio) in snapshot.cache_current_ratios {
            if let Some(level) = cpu_state.cache.levels.iter_mut().find(|l| l.name == name) {
                level.current_hit_ratio = ratio;
            }
        }
        cpu_state.cache.working_set_kb = snapshot.cache_working_set_kb;
        cpu_state.cache.operations_seen = snapshot.cache_operations_seen;
        cpu_state.boost.current_clock_ghz = snapshot.boost_current_clock_ghz;
        cpu_state.boost.ticks_remaining = snapshot.boost_ticks_remaining;
        cpu_state.temperature_c = snapshot.temperature_c;
        cpu_state.busy_cores = snapshot.busy_cores;

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
            if let Ok(state) = CpuState::from_profile(&profile) {
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

    fn xeon_profile() -> EngineProfile {
        let content = include_str!("../../../sim_common/src/profile/defaults/cpu_intel_xeon_6248r.json");
        let doc: sim_common::profile::ProfileDocument = serde_json::from_str(content).unwrap();
        EngineProfile::parse("xeon", doc, EngineKind::Cpu).unwrap()
    }

    fn op(id: &str, complexity: ComplexityClass, language: Language, data_size: u64) -> Operation {
        Operation { id: id.into(), op_type: OperationType::Compute, complexity, language, data_size, next_component: None, metadata: HashMap::new() }
    }

    /// Scenario S1: one compute op, O(1)/go/100 bytes, Minimal complexity,
    /// cold engine. Forcing a guaranteed-L1 cache hit (by giving the test
    /// profile a `cold_start_ratio` of 1.0) isolates the scenario's literal
    /// arithmetic from this op's specific, otherwise-unpredictable hash.
    #[test]
    fn scenario_s1_base_latency_under_xeon_profile() {
        let mut profile = xeon_profile();
        if let sim_common::profile::EngineSpecific::Cpu(cpu) = &mut profile.engine_specific {
            cpu.cache_behavior.cold_start_ratio = 1.0;
        }

        let mut engine = CpuEngine::new(10_000, 42, 0.3);
        engine.set_complexity_level(ComplexityLevel::Minimal);
        engine.load_profile(profile).unwrap();

        let operation = op("s1", ComplexityClass::O1, Language::Go, 100);
        let result = engine.process_operation(&operation, 0).unwrap();

        assert_eq!(result.completion_tick, 8);
        assert!(matches!(result.penalty_info.grade, sim_common::operation::PerformanceGrade::A | sim_common::operation::PerformanceGrade::B));
        assert_eq!(result.metrics.get("cache_level").and_then(|v| v.as_str()), Some("L1"));
    }

    /// Scenario S2: O(n) op, tiny data, 24 cores, parallel processing on.
    #[test]
    fn scenario_s2_small_data_forces_single_core() {
        let profile = xeon_profile();
        let cpu = profile.as_cpu().unwrap().clone();
        let operation = op("s2", ComplexityClass::ON, Language::Rust, 1024);
        assert_eq!(cores::cores_needed(&operation, 24, &cpu.parallel_processing), 1);
    }

    /// Scenario S3: fill the engine queue to capacity, then overflow it.
    #[test]
    fn scenario_s3_queue_overflow_rejection() {
        let mut engine = CpuEngine::new(10_000, 1, 0.3);
        engine.load_profile(xeon_profile()).unwrap();
        let capacity = engine.capacity();

        let mut successes = 0;
        let mut failures = 0;
        for i in 0..capacity + 10 {
            match engine.queue_operation(op(&format!("op-{i}"), ComplexityClass::O1, Language::Rust, 100)) {
                Ok(()) => successes += 1,
                Err(SimError::QueueFull { .. }) => failures += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(successes, capacity);
        assert_eq!(failures, 10);
        assert_eq!(engine.queue_length(), capacity);
    }

    #[test]
    fn invariant_utilization_never_exceeds_one() {
        let mut engine = CpuEngine::new(10_000, 7, 0.3);
        engine.load_profile(xeon_profile()).unwrap();
        for i in 0..50 {
            let _ = engine.queue_operation(op(&format!("op-{i}"), ComplexityClass::ON, Language::Rust, 50_000));
        }
        for tick in 0..200 {
            let _ = engine.process_tick(tick);
            assert!(engine.utilization() <= 1.0);
        }
    }

    #[test]
    fn reset_returns_engine_to_full_health_and_empty_state() {
        let mut engine = CpuEngine::new(10_000, 3, 0.3);
        engine.load_profile(xeon_profile()).unwrap();
        let _ = engine.queue_operation(op("a", ComplexityClass::O1, Language::Rust, 100));
        engine.reset();
        assert_eq!(engine.queue_length(), 0);
        assert_eq!(engine.health(), 1.0);
    }
}
