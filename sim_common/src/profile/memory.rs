//! Memory profile's `engine_specific` typed record (§4.5).

use serde::{Deserialize, Serialize};

/// Memory ordering model consumed by the memory-barrier stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryOrdering {
    /// "weak" or "tso" (total store order).
    pub ordering_model: String,
    /// Instruction reordering window depth.
    pub reordering_window: u32,
    /// Cost of a memory barrier, in ns.
    pub memory_barrier_cost: f64,
    /// Whether load/store reordering is permitted by this model.
    pub load_store_reordering: bool,
}

impl Default for MemoryOrdering {
    fn default() -> Self {
        Self {
            ordering_model: "weak".to_string(),
            reordering_window: 16,
            memory_barrier_cost: 15.0,
            load_store_reordering: true,
        }
    }
}

/// DDR controller/bank-conflict behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerBehavior {
    pub channels: u32,
    pub bank_conflict_penalty: f64,
    pub row_hit_ratio: f64,
}

impl Default for ControllerBehavior {
    fn default() -> Self {
        Self { channels: 2, bank_conflict_penalty: 1.4, row_hit_ratio: 0.8 }
    }
}

/// Bandwidth contention curve, keyed by concurrent-channel count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthBehavior {
    pub contention_curve: std::collections::HashMap<String, f64>,
}

impl Default for BandwidthBehavior {
    fn default() -> Self {
        let mut contention_curve = std::collections::HashMap::new();
        for (n, factor) in [("1", 1.0), ("2", 1.1), ("4", 1.3), ("8", 1.6)] {
            contention_curve.insert(n.to_string(), factor);
        }
        Self { contention_curve }
    }
}

/// ECC behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EccBehavior {
    pub enabled: bool,
    pub correction_penalty: f64,
}

impl Default for EccBehavior {
    fn default() -> Self {
        Self { enabled: false, correction_penalty: 1.02 }
    }
}

/// Power-state behavior (idle/active transitions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerBehavior {
    pub active_power_ratio: f64,
    pub wake_penalty_ns: f64,
}

impl Default for PowerBehavior {
    fn default() -> Self {
        Self { active_power_ratio: 1.0, wake_penalty_ns: 50.0 }
    }
}

/// TLB / page-walk / virtual-memory behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMemoryBehavior {
    pub tlb_hit_ratio: f64,
    pub page_walk_penalty_ns: f64,
}

impl Default for VirtualMemoryBehavior {
    fn default() -> Self {
        Self { tlb_hit_ratio: 0.98, page_walk_penalty_ns: 100.0 }
    }
}

/// The memory engine's full `engine_specific` typed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySpecific {
    pub memory_ordering: MemoryOrdering,
    pub controller_behavior: ControllerBehavior,
    pub bandwidth_behavior: BandwidthBehavior,
    pub ecc_behavior: EccBehavior,
    pub power_behavior: PowerBehavior,
    pub virtual_memory: VirtualMemoryBehavior,
}

impl Default for MemorySpecific {
    fn default() -> Self {
        Self {
            memory_ordering: MemoryOrdering::default(),
            controller_behavior: ControllerBehavior::default(),
            bandwidth_behavior: BandwidthBehavior::default(),
            ecc_behavior: EccBehavior::default(),
            power_behavior: PowerBehavior::default(),
            virtual_memory: VirtualMemoryBehavior::default(),
        }
    }
}
