//! Queue sizing (C7) — a pure function of (profile, complexity) deriving
//! the engine's internal queue and in-flight heap capacities (§4.6, §4.7).

use sim_common::complexity::{ComplexityLevel, EngineKind};
use sim_common::profile::EngineProfile;

/// Complexity multiplier applied to every derived capacity (§4.6).
pub fn complexity_multiplier(level: ComplexityLevel) -> f64 {
    match level {
        ComplexityLevel::Minimal => 0.5,
        ComplexityLevel::Basic => 0.75,
        ComplexityLevel::Advanced => 1.0,
        ComplexityLevel::Maximum => 1.5,
    }
}

/// Per-kind floor below which a derived capacity is never allowed to drop.
fn floor_for(kind: EngineKind) -> usize {
    match kind {
        EngineKind::Cpu => 8,
        EngineKind::Memory => 16,
        EngineKind::Storage => 32,
        EngineKind::Network => 32,
    }
}

/// A realistic worst-case per-operation time estimate, in ms: base time
/// scaled by a complexity factor, a language factor, and a cache-miss
/// penalty factor, so queues are sized for worst-case steady-state
/// throughput rather than the best case (§4.7).
fn realistic_op_time_ms(profile: &EngineProfile) -> f64 {
    let base = profile.baseline("base_processing_time").unwrap_or(1.0).max(0.001);
    let complexity_factor = profile.baseline("complexity_max_factor").unwrap_or(6.0);
    let worst_language_factor = profile
        .as_cpu()
        .map(|c| c.language_performance.values().cloned().fold(1.0f64, f64::min))
        .unwrap_or(1.0)
        .max(0.01);
    let cache_miss_penalty = profile.as_cpu().map(|c| c.cache_behavior.memory_multiplier).unwrap_or(1.0);
    base * complexity_factor / worst_language_factor * cache_miss_penalty
}

fn avg_op_ticks(profile: &EngineProfile, tick_duration_ns: u64) -> f64 {
    let tick_ms = tick_duration_ns as f64 / 1_000_000.0;
    (realistic_op_time_ms(profile) / tick_ms).max(1.0)
}

/// Derive the engine's internal queue capacity from its profile and
/// complexity level.
pub fn queue_capacity(profile: &EngineProfile, level: ComplexityLevel, tick_duration_ns: u64) -> usize {
    let multiplier = complexity_multiplier(level);
    let ticks = avg_op_ticks(profile, tick_duration_ns);
    let ops_per_tick = profile.baseline("max_ops_per_tick").unwrap_or(3.0).max(1.0);

    let raw = match profile.kind {
        EngineKind::Cpu => {
            let cores = profile.baseline("cores").unwrap_or(1.0);
            cores * ticks / ops_per_tick * 2.0
        }
        EngineKind::Memory => {
            let channels = profile.as_memory().map(|m| m.controller_behavior.channels as f64).unwrap_or(2.0);
            channels * ticks / ops_per_tick * 1.5
        }
        EngineKind::Storage => {
            let max_iops = profile.baseline("max_iops").unwrap_or(10_000.0);
            let avg_latency_ms = profile.baseline("avg_latency_ms").unwrap_or(1.0).max(0.001);
            max_iops * avg_latency_ms / 1000.0
        }
        EngineKind::Network => {
            let bandwidth_mbps = profile.baseline("bandwidth_mbps").unwrap_or(1000.0);
            let latency_ms = profile.baseline("base_latency_ms").unwrap_or(1.0).max(0.001);
            (bandwidth_mbps / 100.0) * latency_ms
        }
    };

    ((raw * multiplier).round() as usize).max(floor_for(profile.kind))
}

/// Derive the engine's in-flight heap capacity. Sized generously relative
/// to the queue capacity so the fetch cycle, not the heap, is normally the
/// binding constraint.
pub fn heap_capacity(profile: &EngineProfile, level: ComplexityLevel, tick_duration_ns: u64) -> usize {
    let queue_cap = queue_capacity(profile, level, tick_duration_ns);
    (queue_cap / 2).max(floor_for(profile.kind) / 2).max(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_common::complexity::EngineKind;
    use sim_common::profile::{EngineProfile, EngineSpecific};
    use std::collections::HashMap;

    fn cpu_profile() -> EngineProfile {
        let mut baseline = HashMap::new();
        baseline.insert("cores".to_string(), 24.0);
        baseline.insert("base_clock".to_string(), 3.0);
        baseline.insert("base_processing_time".to_string(), 0.08);
        baseline.insert("complexity_max_factor".to_string(), 6.0);
        EngineProfile {
            name: "test".into(),
            kind: EngineKind::Cpu,
            description: String::new(),
            version: "1.0".into(),
            baseline_performance: baseline,
            technology_specs: HashMap::new(),
            engine_specific: EngineSpecific::Cpu(Default::default()),
        }
    }

    #[test]
    fn higher_complexity_yields_larger_queue() {
        let profile = cpu_profile();
        let minimal = queue_capacity(&profile, ComplexityLevel::Minimal, 10_000);
        let maximum = queue_capacity(&profile, ComplexityLevel::Maximum, 10_000);
        assert!(maximum > minimal);
    }

    #[test]
    fn never_drops_below_the_kind_floor() {
        let profile = cpu_profile();
        let cap = queue_capacity(&profile, ComplexityLevel::Minimal, 10_000_000_000);
        assert!(cap >= floor_for(EngineKind::Cpu));
    }

    #[test]
    fn heap_capacity_is_smaller_than_queue_capacity() {
        let profile = cpu_profile();
        let queue_cap = queue_capacity(&profile, ComplexityLevel::Advanced, 10_000);
        let heap_cap = heap_capacity(&profile, ComplexityLevel::Advanced, 10_000);
        assert!(heap_cap <= queue_cap);
    }
}
