//! The storage pipeline's domain stages (§4.5): IOPS/queue-depth limits,
//! sequential/random pattern optimization, controller cache, TRIM/GC,
//! fragmentation, wear leveling, thermal, compression, encryption,
//! multi-stream and zoned-storage behavior.

use crate::base::op_hash_fraction;
use crate::cpu::stages::{classify_access_pattern, AccessPattern};
use sim_common::operation::{Operation, OperationType};
use sim_common::profile::storage::{ControllerCacheBehavior, MaintenanceBehavior, QueueBehavior, StorageAdvanced};

/// S1: the drive's advertised average latency, clamped to the documented range.
pub fn iops_limits(avg_latency_ms: f64) -> f64 {
    avg_latency_ms.clamp(0.001, 1000.0)
}

/// Queue-depth pressure from the drive's own command queue, distinct from
/// the wrapper-level queue pressure the common-factors stage accounts for.
pub fn queue_depth(latency_ms: f64, in_flight: usize, queue: &QueueBehavior) -> f64 {
    let ratio = (in_flight as f64 / queue.queue_depth.max(1) as f64).min(1.0);
    latency_ms * (1.0 + ratio * 0.5)
}

/// Sequential access is cheaper than random on every storage medium.
pub fn pattern_optimization(latency_ms: f64, op: &Operation, queue: &QueueBehavior) -> f64 {
    match classify_access_pattern(op) {
        AccessPattern::Sequential | AccessPattern::Stride => latency_ms * queue.sequential_bonus,
        AccessPattern::Random => latency_ms * queue.random_penalty,
        AccessPattern::Pattern => latency_ms,
    }
}

/// A hit in the controller's onboard DRAM cache shortcuts the full access.
pub fn controller_cache(latency_ms: f64, op: &Operation, cache: &ControllerCacheBehavior) -> (f64, bool) {
    let fraction = op_hash_fraction(op, 0xCAC4_0000);
    if fraction < cache.hit_ratio {
        (latency_ms * cache.hit_multiplier, true)
    } else {
        (latency_ms, false)
    }
}

/// Writes occasionally trigger background garbage collection.
pub fn trim_gc(latency_ms: f64, op: &Operation, maintenance: &MaintenanceBehavior) -> f64 {
    if !matches!(op.op_type, OperationType::StorageWrite) {
        return latency_ms;
    }
    let fraction = op_hash_fraction(op, 0x7216_6C00);
    if fraction < 0.1 {
        latency_ms * maintenance.gc_penalty
    } else {
        latency_ms
    }
}

/// Fragmentation overhead, amortized rather than all-or-nothing.
pub fn fragmentation(latency_ms: f64, maintenance: &MaintenanceBehavior) -> f64 {
    latency_ms * (1.0 + (maintenance.fragmentation_penalty - 1.0) * 0.5)
}

/// Wear-leveling overhead paid on writes, which is what actually wears flash.
pub fn wear_leveling(latency_ms: f64, op: &Operation, maintenance: &MaintenanceBehavior) -> f64 {
    if matches!(op.op_type, OperationType::StorageWrite) {
        latency_ms * maintenance.wear_leveling_overhead
    } else {
        latency_ms
    }
}

/// Thermal throttling once the drive's accumulated heat crosses its limit.
pub fn storage_thermal(latency_ms: f64, throttled: bool, advanced: &StorageAdvanced) -> f64 {
    if throttled {
        latency_ms / advanced.thermal_throttle_factor.clamp(0.5, 1.0)
    } else {
        latency_ms
    }
}

/// Compression reduces the effective bytes moved, and so the latency.
pub fn compression(latency_ms: f64, advanced: &StorageAdvanced) -> f64 {
    latency_ms / advanced.compression_ratio.max(0.01)
}

/// Encryption is a fixed per-access overhead when enabled via a penalty > 1.
pub fn encryption(latency_ms: f64, advanced: &StorageAdvanced) -> f64 {
    latency_ms * advanced.encryption_penalty
}

/// Writes striped across multiple independent streams complete faster.
pub fn multi_stream(latency_ms: f64, op: &Operation, advanced: &StorageAdvanced) -> f64 {
    if matches!(op.op_type, OperationType::StorageWrite) && advanced.multi_stream_channels > 1 {
        latency_ms / (1.0 + (advanced.multi_stream_channels as f64 - 1.0) * 0.1)
    } else {
        latency_ms
    }
}

/// Zoned drives punish random writes harder (no in-place rewrite) but
/// reward sequential ones.
pub fn zoned_storage(latency_ms: f64, op: &Operation, advanced: &StorageAdvanced) -> f64 {
    if !advanced.zoned || !matches!(op.op_type, OperationType::StorageWrite) {
        return latency_ms;
    }
    match classify_access_pattern(op) {
        AccessPattern::Random => latency_ms * 1.1,
        _ => latency_ms * 0.95,
    }
}

/// A storage operation always occupies one command-queue slot.
pub fn slots_needed(_op: &Operation) -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_common::operation::{ComplexityClass, Language};
    use std::collections::HashMap;

    fn op(op_type: OperationType, pattern: &str) -> Operation {
        let mut metadata = HashMap::new();
        metadata.insert("access_pattern".to_string(), serde_json::json!(pattern));
        Operation { id: "s1".into(), op_type, complexity: ComplexityClass::O1, language: Language::Rust, data_size: 4096, next_component: None, metadata }
    }

    #[test]
    fn sequential_is_cheaper_than_random() {
        let queue = QueueBehavior::default();
        let seq = pattern_optimization(1.0, &op(OperationType::StorageRead, "sequential"), &queue);
        let rand = pattern_optimization(1.0, &op(OperationType::StorageRead, "random"), &queue);
        assert!(seq < rand);
    }

    #[test]
    fn reads_never_pay_wear_leveling() {
        let maintenance = MaintenanceBehavior::default();
        let t = wear_leveling(1.0, &op(OperationType::StorageRead, "random"), &maintenance);
        assert_eq!(t, 1.0);
    }

    #[test]
    fn compression_never_increases_latency() {
        let advanced = StorageAdvanced { compression_ratio: 2.0, ..StorageAdvanced::default() };
        assert!(compression(1.0, &advanced) < 1.0);
    }
}
