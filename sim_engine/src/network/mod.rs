//! Network engine pipeline (C5) — bandwidth limits, protocol overhead,
//! congestion, packet loss, jitter, QoS and geographic/topology latency.

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

struct NetworkState {
    total_lanes: u32,
    busy_lanes: u32,
}

impl NetworkState {
    fn from_profile(profile: &EngineProfile) -> SimResult<Self> {
        if profile.as_network().is_none() {
            return Err(SimError::InvalidProfile { path: profile.name.clone(), reason: "profile is not a network profile".to_string() });
        }
        let bandwidth_mbps = profile.baseline("bandwidth_mbps").unwrap_or(1000.0);
        let total_lanes = (bandwidth_mbps / 100.0).max(1.0).round() as u32;
        Ok(Self { total_lanes, busy_lanes: 0 })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkDynamicState {
    busy_lanes: u32,
    health_score: f64,
    total_operations: u64,
    completed_operations: u64,
    failed_operations: u64,
    in_flight: Vec<ProcessingOperation>,
}

/// The network engine: link-bound archetype reusing the common engine base
/// with protocol/congestion/QoS/topology domain stages.
pub struct NetworkEngine {
    base: EngineBase,
    state: Option<NetworkState>,
    profile: Option<EngineProfile>,
    complexity_set: ComplexitySet,
    complexity_level: ComplexityLevel,
    in_flight: BinaryHeap<ProcessingOperation>,
    heap_capacity: usize,
    tick_duration_ns: u64,
}

impl NetworkEngine {
    pub fn new(tick_duration_ns: u64, variance_seed: u64, pressure_factor: f64) -> Self {
        Self {
            base: EngineBase::new(0, 256, tick_duration_ns, variance_seed, pressure_factor),
            state: None,
            profile: None,
            complexity_set: feature_set(ComplexityLevel::Advanced, EngineKind::Network),
            complexity_level: ComplexityLevel::Advanced,
            in_flight: BinaryHeap::new(),
            heap_capacity: 64,
            tick_duration_ns,
        }
    }

    fn state_mut(&mut self) -> SimResult<&mut NetworkState> {
        self.state.as_mut().ok_or_else(|| SimError::InvalidProfile { path: "<none>".to_string(), reason: "no profile loaded".to_string() })
    }

    fn run_pipeline(&mut self, op: &Operation) -> SimResult<(f64, PenaltyInformation, serde_json::Value)> {
        let profile = self.profile.as_ref().ok_or_else(|| SimError::InvalidProfile { path: "<none>".to_string(), reason: "no profile loaded".to_string() })?;
        let network = profile.as_network().expect("profile kind checked at load time");
        let set = &self.complexity_set;
        let state = self.state.as_ref().expect("state present alongside profile");

        let base_latency_ms = profile.baseline("base_latency_ms").unwrap_or(1.0);
        let mut t = stages::bandwidth_limits(base_latency_ms);

        if set.should_enable("protocol_overhead") {
            t = stages::protocol_overhead(t, op, &network.protocol_behavior);
        }
        let utilization = if state.total_lanes == 0 { 0.0 } else { state.busy_lanes as f64 / state.total_lanes as f64 };
        if set.should_enable("congestion") {
            t = stages::congestion(t, utilization, &network.congestion_behavior);
        }
        let mut packet_lost = false;
        if set.should_enable("packet_loss") {
            let (t2, lost) = stages::packet_loss(t, op, &network.congestion_behavior);
            t = t2;
            packet_lost = lost;
        }
        if set.should_enable("jitter") {
            t = stages::jitter(t, op, &network.congestion_behavior);
        }
        if set.should_enable("qos") {
            t = stages::qos(t, op, &network.qos_behavior);
        }
        if set.should_enable("geo_latency") {
            t = stages::geo_latency(t, &network.topology_behavior);
        }
        if set.should_enable("topology") {
            t = stages::topology(t, op, &network.topology_behavior);
        }

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
        metrics.insert("packet_lost".to_string(), serde_json::json!(packet_lost));

        Ok((t.max(0.001), penalty_info, serde_json::Value::Object(metrics)))
    }
}

impl Engine for NetworkEngine {
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
        self.state.as_ref().map(|s| if s.total_lanes == 0 { 0.0 } else { s.busy_lanes as f64 / s.total_lanes as f64 }).unwrap_or(0.0)
    }

    fn health(&self) -> f64 {
        self.base.health.score()
    }

    fn set_complexity_level(&mut self, level: ComplexityLevel) {
        self.complexity_level = level;
        self.complexity_set = feature_set(level, EngineKind::Network);
        if let Some(profile) = &self.profile {
            self.heap_capacity = queue_sizing::heap_capacity(profile, level, self.tick_duration_ns);
        }
    }

    fn load_profile(&mut self, profile: EngineProfile) -> SimResult<()> {
        if profile.kind != EngineKind::Network {
            return Err(SimError::InvalidProfile { path: profile.name.clone(), reason: "expected a network profile".to_string() });
        }
        let state = NetworkState::from_profile(&profile)?;
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
                state.busy_lanes = state.busy_lanes.saturating_sub(done.resource_units);
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
            let lanes_used = stages::lanes_needed(&op);
            let free_lanes = {
                let state = match &self.state {
                    Some(s) => s,
                    None => {
                        self.base.queue.push_front(op);
                        break;
                    }
                };
                state.total_lanes.saturating_sub(state.busy_lanes)
            };
            if lanes_used > free_lanes {
                self.base.queue.push_front(op);
                break;
            }

            let result = self.process_operation(&op, tick)?;
            let sequence = self.base.next_sequence();
            if let Some(state) = self.state.as_mut() {
                state.busy_lanes += lanes_used;
            }
            self.base.total_operations += 1;
            self.in_flight.push(ProcessingOperation {
                operation: op,
                start_tick: tick,
                completion_tick: result.completion_tick,
                resource_units: lanes_used,
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
        let snapshot = NetworkDynamicState {
            busy_lanes: state.busy_lanes,
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
        let snapshot: NetworkDynamicState = serde_json::from_value(state)?;
        let net_state = self.state_mut()?;
        net_state.busy_lanes = snapshot.busy_lanes;
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
            if let Ok(state) = NetworkState::from_profile(&profile) {
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

    fn gigabit_profile() -> EngineProfile {
        let content = include_str!("../../../sim_common/src/profile/defaults/network_gigabit_ethernet.json");
        let doc: sim_common::profile::ProfileDocument = serde_json::from_str(content).unwrap();
        EngineProfile::parse("gigabit_ethernet", doc, EngineKind::Network).unwrap()
    }

    fn op(id: &str) -> Operation {
        Operation { id: id.into(), op_type: OperationType::NetworkRequest, complexity: ComplexityClass::O1, language: Language::Rust, data_size: 1500, next_component: None, metadata: HashMap::new() }
    }

    #[test]
    fn process_operation_returns_positive_latency() {
        let mut engine = NetworkEngine::new(10_000, 9, 0.3);
        engine.load_profile(gigabit_profile()).unwrap();
        let result = engine.process_operation(&op("n1"), 0).unwrap();
        assert!(result.processing_time_ms > 0.0);
    }

    #[test]
    fn lanes_derived_from_bandwidth_are_at_least_one() {
        let mut engine = NetworkEngine::new(10_000, 10, 0.3);
        engine.load_profile(gigabit_profile()).unwrap();
        assert!(engine.utilization() >= 0.0);
    }

    #[test]
    fn reset_returns_to_full_health() {
        let mut engine = NetworkEngine::new(10_000, 11, 0.3);
        engine.load_profile(gigabit_profile()).unwrap();
        let _ = engine.queue_operation(op("a"));
        engine.reset();
        assert_eq!(engine.queue_length(), 0);
        assert_eq!(engine.health(), 1.0);
    }
}
