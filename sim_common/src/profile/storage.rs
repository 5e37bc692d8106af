//! Storage profile's `engine_specific` typed record (§4.5).

use serde::{Deserialize, Serialize};

/// IOPS/queue-depth behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueBehavior {
    pub queue_depth: u32,
    pub sequential_bonus: f64,
    pub random_penalty: f64,
}

impl Default for QueueBehavior {
    fn default() -> Self {
        Self { queue_depth: 32, sequential_bonus: 0.7, random_penalty: 1.5 }
    }
}

/// Controller cache behavior (DRAM write cache on the drive).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerCacheBehavior {
    pub cache_size_mb: f64,
    pub hit_ratio: f64,
    pub hit_multiplier: f64,
}

impl Default for ControllerCacheBehavior {
    fn default() -> Self {
        Self { cache_size_mb: 512.0, hit_ratio: 0.3, hit_multiplier: 0.2 }
    }
}

/// TRIM/GC and wear-leveling/fragmentation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceBehavior {
    pub gc_penalty: f64,
    pub fragmentation_penalty: f64,
    pub wear_leveling_overhead: f64,
}

impl Default for MaintenanceBehavior {
    fn default() -> Self {
        Self { gc_penalty: 1.1, fragmentation_penalty: 1.05, wear_leveling_overhead: 1.02 }
    }
}

/// Thermal, compression, encryption and multi-stream/zoned behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageAdvanced {
    pub thermal_throttle_factor: f64,
    pub compression_ratio: f64,
    pub encryption_penalty: f64,
    pub multi_stream_channels: u32,
    pub zoned: bool,
}

impl Default for StorageAdvanced {
    fn default() -> Self {
        Self {
            thermal_throttle_factor: 0.9,
            compression_ratio: 1.0,
            encryption_penalty: 1.05,
            multi_stream_channels: 1,
            zoned: false,
        }
    }
}

/// The storage engine's full `engine_specific` typed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSpecific {
    pub queue_behavior: QueueBehavior,
    pub controller_cache: ControllerCacheBehavior,
    pub maintenance: MaintenanceBehavior,
    pub advanced: StorageAdvanced,
}

impl Default for StorageSpecific {
    fn default() -> Self {
        Self {
            queue_behavior: QueueBehavior::default(),
            controller_cache: ControllerCacheBehavior::default(),
            maintenance: MaintenanceBehavior::default(),
            advanced: StorageAdvanced::default(),
        }
    }
}
