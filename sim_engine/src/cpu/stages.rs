//! The CPU pipeline's non-cache, non-core-allocation stages (§4.4: S1-S4,
//! S6, S7, S9-S13). Each function is a pure transform from a latency and
//! some read-only context to a new latency, occasionally alongside a
//! diagnostic value reported back to the caller for the result's metrics
//! map.

use crate::base::op_hash_fraction;
use sim_common::operation::Operation;
use sim_common::profile::cpu::{BoostBehavior, BranchPrediction, HardwarePrefetch, NumaBehavior, VectorizationSpec};

/// S1: base latency, clamped to the documented [0.001, 1000] ms range.
pub fn base_latency_ms(base_processing_time_ms: f64, clock_normalization_baseline: f64, base_clock_ghz: f64) -> f64 {
    let t = base_processing_time_ms * (clock_normalization_baseline / base_clock_ghz.max(0.0001));
    t.clamp(0.001, 1000.0)
}

/// S2: language multiplier. Unknown languages (missing from the profile's
/// table) pass through at 1.0 with a warning.
pub fn language_multiplier(latency_ms: f64, op: &Operation, language_performance: &std::collections::HashMap<String, f64>) -> f64 {
    let factor = match language_performance.get(op.language.key()) {
        Some(f) => *f,
        None => {
            tracing::warn!(language = op.language.key(), "no language performance factor in profile, using 1.0");
            1.0
        }
    };
    latency_ms / factor.max(0.0001)
}

/// S3: complexity scaling for superlinear complexity classes.
pub fn complexity_scaling(latency_ms: f64, op: &Operation, log_factor: f64, max_factor: f64) -> f64 {
    if !op.complexity.scales_with_size() {
        return latency_ms;
    }
    let size_kb = op.data_size_kb().max(1.0);
    let factor = (1.0 + size_kb.log10().max(0.0) * log_factor).min(max_factor);
    latency_ms * factor
}

/// S4: vectorization speedup, applied when the operation is vectorizable.
pub fn vectorization(latency_ms: f64, op: &Operation, spec: &VectorizationSpec) -> f64 {
    let ratio = spec.vectorizability_ratio.get(op.op_type.to_string().as_str()).copied();
    let is_vectorizable = ratio.is_some() || op.metadata_flag("vectorizable");
    if !is_vectorizable {
        return latency_ms;
    }
    let ratio = ratio.unwrap_or(0.5);
    let speedup = (spec.width_bits / 64.0 * spec.simd_efficiency * ratio).min(16.0).max(1.0);
    latency_ms / speedup
}

/// The access pattern an operation is classified into, for S6/S7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    Sequential,
    Stride,
    Pattern,
    Random,
}

impl AccessPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPattern::Sequential => "sequential",
            AccessPattern::Stride => "stride",
            AccessPattern::Pattern => "pattern",
            AccessPattern::Random => "random",
        }
    }
}

/// Classify an operation's access pattern from its metadata hint, falling
/// back to a deterministic hash-based classification when absent.
pub fn classify_access_pattern(op: &Operation) -> AccessPattern {
    match op.metadata_str("access_pattern") {
        Some("sequential") => return AccessPattern::Sequential,
        Some("stride") => return AccessPattern::Stride,
        Some("pattern") => return AccessPattern::Pattern,
        Some("random") => return AccessPattern::Random,
        _ => {}
    }
    let fraction = op_hash_fraction(op, 0xACCE_55A0);
    if fraction < 0.4 {
        AccessPattern::Sequential
    } else if fraction < 0.65 {
        AccessPattern::Stride
    } else if fraction < 0.85 {
        AccessPattern::Pattern
    } else {
        AccessPattern::Random
    }
}

/// S6: advanced prefetch. A pattern-hash hit reduces latency by
/// `0.3 * accuracy[pattern]`.
pub fn advanced_prefetch(latency_ms: f64, op: &Operation, prefetch: &HardwarePrefetch, pattern: AccessPattern) -> f64 {
    let accuracy = prefetch.pattern_accuracy.get(pattern.as_str()).copied().unwrap_or(0.0);
    let fraction = op_hash_fraction(op, 0xF0E7_C401);
    if fraction < accuracy {
        latency_ms * (1.0 - 0.3 * accuracy)
    } else {
        latency_ms
    }
}

/// Whether an operation is branch-heavy enough to run S7 at all.
pub fn has_branches(op: &Operation) -> bool {
    op.complexity.is_branch_heavy() || op.language.is_interpreted()
}

/// S7: branch prediction. On a misprediction (hash miss against pattern
/// accuracy) multiply by `1 + misprediction_penalty`.
pub fn branch_prediction(latency_ms: f64, op: &Operation, branch: &BranchPrediction) -> (f64, bool) {
    if !has_branches(op) {
        return (latency_ms, false);
    }
    let pattern = match op.metadata_str("branch_pattern") {
        Some(p) => p.to_string(),
        None => "random".to_string(),
    };
    let accuracy = branch.accuracy_by_pattern.get(&pattern).copied().unwrap_or(0.9);
    let fraction = op_hash_fraction(op, 0xB2A7_C000);
    if fraction >= accuracy {
        (latency_ms * (1.0 + branch.misprediction_penalty), true)
    } else {
        (latency_ms, false)
    }
}

/// Boost-clock state, persisted across ticks (S9).
#[derive(Debug, Clone)]
pub struct BoostState {
    pub current_clock_ghz: f64,
    pub ticks_remaining: u64,
}

impl BoostState {
    pub fn new(base_clock_ghz: f64) -> Self {
        Self { current_clock_ghz: base_clock_ghz, ticks_remaining: 0 }
    }

    /// Advance boost decay by one tick (called once per `process_tick`,
    /// not once per operation).
    pub fn decay_one_tick(&mut self, base_clock_ghz: f64, ramp_down_pct_per_tick: f64) {
        if self.ticks_remaining > 0 {
            self.ticks_remaining -= 1;
        } else {
            let floor = base_clock_ghz;
            self.current_clock_ghz = (self.current_clock_ghz * (1.0 - ramp_down_pct_per_tick)).max(floor);
        }
    }
}

/// S9: boost clocks. Computes the target clock from busy-core bands,
/// applies thermal-linear throttling above 90% of the limit, then returns
/// the latency scaled by `base_clock / current_clock`.
pub fn boost_clocks(
    latency_ms: f64,
    busy_cores: u32,
    total_cores: u32,
    base_clock_ghz: f64,
    boost: &BoostBehavior,
    state: &mut BoostState,
    temperature_c: f64,
    thermal_limit_c: f64,
    throttle_floor: f64,
) -> f64 {
    let busy_ratio = if total_cores > 0 { busy_cores as f64 / total_cores as f64 } else { 0.0 };
    let target = if busy_cores <= 1 {
        boost.single_core_boost_ghz
    } else if busy_ratio <= 0.25 {
        boost.single_core_boost_ghz * 0.95
    } else if busy_ratio <= 0.5 {
        boost.all_core_boost_ghz * 1.10
    } else {
        boost.all_core_boost_ghz
    };

    // Smooth transition: instant up, ramp down is handled per-tick by `decay_one_tick`.
    if target > state.current_clock_ghz {
        state.current_clock_ghz = target;
        state.ticks_remaining = boost.boost_duration_ticks;
    }

    let thermal_threshold = thermal_limit_c * 0.9;
    let mut clock = state.current_clock_ghz;
    if temperature_c > thermal_threshold && thermal_limit_c > thermal_threshold {
        let overshoot = (temperature_c - thermal_threshold) / (thermal_limit_c - thermal_threshold);
        let throttle = (1.0 - overshoot).max(throttle_floor);
        clock *= throttle;
    }

    latency_ms * base_clock_ghz / clock.max(0.0001)
}

/// S10: NUMA locality. With probability `local_memory_ratio` the operation
/// stays local (no penalty); otherwise it crosses sockets.
pub fn numa(latency_ms: f64, op: &Operation, numa: &NumaBehavior) -> (f64, bool) {
    if numa.numa_nodes <= 1 {
        return (latency_ms, true);
    }
    let fraction = op_hash_fraction(op, 0x17A7_0000);
    if fraction < numa.local_memory_ratio {
        (latency_ms, true)
    } else {
        (latency_ms * numa.cross_socket_penalty, false)
    }
}

/// S11: memory bandwidth contention. Interpolates the profile's
/// core-count-keyed contention curve at `cores_needed`, scaled by the
/// operation's memory intensity.
pub fn bandwidth_contention(latency_ms: f64, cores_needed: u32, contention_curve: &std::collections::HashMap<String, f64>, memory_intensity: f64) -> f64 {
    let factor = interpolate_curve(contention_curve, cores_needed).unwrap_or(1.0);
    latency_ms * (1.0 + (factor - 1.0) * memory_intensity.clamp(0.0, 1.0))
}

/// Linear interpolation over a curve keyed by integer-string core counts.
pub fn interpolate_curve(curve: &std::collections::HashMap<String, f64>, at: u32) -> Option<f64> {
    if curve.is_empty() {
        return None;
    }
    let mut points: Vec<(u32, f64)> = curve
        .iter()
        .filter_map(|(k, v)| k.parse::<u32>().ok().map(|n| (n, *v)))
        .collect();
    if points.is_empty() {
        return None;
    }
    points.sort_by_key(|(n, _)| *n);

    if let Some(&(_, v)) = points.iter().find(|(n, _)| *n == at) {
        return Some(v);
    }
    if at <= points[0].0 {
        return Some(points[0].1);
    }
    if at >= points[points.len() - 1].0 {
        return Some(points[points.len() - 1].1);
    }
    for window in points.windows(2) {
        let (n0, v0) = window[0];
        let (n1, v1) = window[1];
        if at > n0 && at < n1 {
            let t = (at - n0) as f64 / (n1 - n0) as f64;
            return Some(v0 + (v1 - v0) * t);
        }
    }
    None
}

/// The throttle factor for a given temperature: 1.0 below 95% of the
/// thermal limit, decreasing linearly to `throttle_floor` at the limit
/// itself (invariant: `0.5 <= throttle_factor <= 1.0`).
pub fn throttle_factor_for(temperature_c: f64, thermal_limit_c: f64, throttle_floor: f64) -> f64 {
    let threshold = thermal_limit_c * 0.95;
    if temperature_c <= threshold || thermal_limit_c <= threshold {
        return 1.0;
    }
    let overshoot = ((temperature_c - threshold) / (thermal_limit_c - threshold)).clamp(0.0, 1.0);
    (1.0 - overshoot * (1.0 - throttle_floor)).clamp(throttle_floor, 1.0)
}

/// S12: thermal throttling. Above 95% of the thermal limit, scale latency
/// up by `1/throttle_factor`.
pub fn thermal_throttling(latency_ms: f64, temperature_c: f64, thermal_limit_c: f64, throttle_factor: f64) -> f64 {
    if temperature_c > thermal_limit_c * 0.95 {
        latency_ms / throttle_factor.max(0.01)
    } else {
        latency_ms
    }
}

/// Heat accumulated by running this operation, added to engine temperature
/// after S12 (§4.4).
pub fn heat_generated(utilization: f64, complexity_weight: f64, duration_ms: f64, heat_capacity: f64) -> f64 {
    let power = utilization.clamp(0.0, 1.0) * complexity_weight.max(0.1);
    power * duration_ms / heat_capacity.max(0.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_latency_matches_scenario_s1_math() {
        let t = base_latency_ms(0.08, 3.0, 3.0);
        assert!((t - 0.08).abs() < 1e-9);
    }

    #[test]
    fn base_latency_clamps_to_documented_range() {
        assert_eq!(base_latency_ms(0.0000001, 1.0, 1.0), 0.001);
        assert_eq!(base_latency_ms(10_000.0, 1.0, 1.0), 1000.0);
    }

    #[test]
    fn complexity_scaling_is_identity_for_o1() {
        let op = Operation {
            id: "a".into(),
            op_type: sim_common::operation::OperationType::Compute,
            complexity: sim_common::operation::ComplexityClass::O1,
            language: sim_common::operation::Language::Rust,
            data_size: 1_000_000,
            next_component: None,
            metadata: Default::default(),
        };
        assert_eq!(complexity_scaling(1.0, &op, 0.35, 6.0), 1.0);
    }

    #[test]
    fn interpolation_matches_exact_key() {
        let mut curve = std::collections::HashMap::new();
        curve.insert("1".to_string(), 1.0);
        curve.insert("8".to_string(), 1.35);
        assert_eq!(interpolate_curve(&curve, 1), Some(1.0));
        assert_eq!(interpolate_curve(&curve, 8), Some(1.35));
    }

    #[test]
    fn interpolation_is_linear_between_points() {
        let mut curve = std::collections::HashMap::new();
        curve.insert("2".to_string(), 1.0);
        curve.insert("4".to_string(), 2.0);
        assert_eq!(interpolate_curve(&curve, 3), Some(1.5));
    }

    #[test]
    fn thermal_throttle_only_triggers_above_95_percent() {
        assert_eq!(thermal_throttling(1.0, 80.0, 95.0, 0.8), 1.0);
        assert!(thermal_throttling(1.0, 94.0, 95.0, 0.8) > 1.0);
    }
}
