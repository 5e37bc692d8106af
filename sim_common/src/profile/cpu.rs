//! CPU profile's `engine_specific` typed record (§3, §4.4).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One level of the cache hierarchy (L1/L2/L3/memory, §4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheLevelSpec {
    /// Cache level name, e.g. "L1", "L2", "L3", "memory".
    pub name: String,
    /// Target (steady-state) hit ratio for this level.
    pub target_hit_ratio: f64,
    /// Cache size in kilobytes (absent/huge for the "memory" pseudo-level).
    #[serde(default = "default_cache_size_kb")]
    pub size_kb: f64,
    /// Latency multiplier applied on a hit at this level, relative to base latency.
    pub multiplier: f64,
}

fn default_cache_size_kb() -> f64 {
    f64::MAX
}

/// Cache hierarchy behavior (§4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheBehavior {
    pub levels: Vec<CacheLevelSpec>,
    pub warmup_operations: u32,
    pub cold_start_ratio: f64,
    pub pressure_factor: f64,
    pub memory_multiplier: f64,
}

impl Default for CacheBehavior {
    fn default() -> Self {
        Self {
            levels: vec![
                CacheLevelSpec { name: "L1".into(), target_hit_ratio: 0.95, size_kb: 32.0, multiplier: 1.0 },
                CacheLevelSpec { name: "L2".into(), target_hit_ratio: 0.85, size_kb: 1024.0, multiplier: 1.2 },
                CacheLevelSpec { name: "L3".into(), target_hit_ratio: 0.70, size_kb: 30_000.0, multiplier: 2.0 },
            ],
            warmup_operations: 100,
            cold_start_ratio: 0.5,
            pressure_factor: 0.3,
            memory_multiplier: 8.0,
        }
    }
}

impl CacheBehavior {
    /// Total configured cache size across all levels, in KB.
    pub fn total_cache_size_kb(&self) -> f64 {
        self.levels.iter().map(|l| l.size_kb).sum()
    }
}

/// Thermal model (§4.4 S12, accumulated-heat update in §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalBehavior {
    pub ambient_c: f64,
    pub thermal_limit_c: f64,
    pub throttle_floor: f64,
    pub heat_capacity: f64,
    pub cooling_rate: f64,
}

impl Default for ThermalBehavior {
    fn default() -> Self {
        Self {
            ambient_c: 35.0,
            thermal_limit_c: 95.0,
            throttle_floor: 0.5,
            heat_capacity: 50.0,
            cooling_rate: 0.05,
        }
    }
}

/// Boost-clock model (§4.4 S9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostBehavior {
    pub single_core_boost_ghz: f64,
    pub all_core_boost_ghz: f64,
    pub boost_duration_ticks: u64,
    pub ramp_down_pct_per_tick: f64,
}

impl Default for BoostBehavior {
    fn default() -> Self {
        Self {
            single_core_boost_ghz: 4.0,
            all_core_boost_ghz: 3.2,
            boost_duration_ticks: 10_000,
            ramp_down_pct_per_tick: 0.10,
        }
    }
}

/// NUMA model (§4.4 S10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumaBehavior {
    pub numa_nodes: u32,
    pub local_memory_ratio: f64,
    pub cross_socket_penalty: f64,
}

impl Default for NumaBehavior {
    fn default() -> Self {
        Self { numa_nodes: 1, local_memory_ratio: 0.9, cross_socket_penalty: 1.3 }
    }
}

/// Branch prediction model (§4.4 S7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchPrediction {
    pub accuracy_by_pattern: HashMap<String, f64>,
    pub misprediction_penalty: f64,
}

impl Default for BranchPrediction {
    fn default() -> Self {
        let mut accuracy_by_pattern = HashMap::new();
        accuracy_by_pattern.insert("loop".to_string(), 0.97);
        accuracy_by_pattern.insert("call_return".to_string(), 0.95);
        accuracy_by_pattern.insert("predictable".to_string(), 0.99);
        accuracy_by_pattern.insert("random".to_string(), 0.55);
        Self { accuracy_by_pattern, misprediction_penalty: 0.2 }
    }
}

/// Memory-bandwidth contention model (§4.4 S11).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBandwidthContention {
    /// Contention curve keyed by core count, e.g. "1" -> 1.0, "8" -> 1.4.
    pub contention_curve: HashMap<String, f64>,
}

impl Default for MemoryBandwidthContention {
    fn default() -> Self {
        let mut contention_curve = HashMap::new();
        for (cores, factor) in [("1", 1.0), ("2", 1.05), ("4", 1.15), ("8", 1.35), ("16", 1.6), ("24", 1.9)] {
            contention_curve.insert(cores.to_string(), factor);
        }
        Self { contention_curve }
    }
}

/// Parallel-processing model (§4.4 S8, §4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelProcessing {
    /// Parallelizable fraction P, keyed by complexity class.
    pub parallelizability_by_complexity: HashMap<String, f64>,
    /// Per-core-count efficiency multiplier, keyed by core count as a string.
    pub efficiency_curve: HashMap<String, f64>,
    /// Max cores usable, keyed by complexity class.
    pub cores_cap_by_complexity: HashMap<String, u32>,
}

impl Default for ParallelProcessing {
    fn default() -> Self {
        let mut parallelizability_by_complexity = HashMap::new();
        parallelizability_by_complexity.insert("O(1)".to_string(), 0.0);
        parallelizability_by_complexity.insert("O(log n)".to_string(), 0.2);
        parallelizability_by_complexity.insert("O(n)".to_string(), 0.6);
        parallelizability_by_complexity.insert("O(n log n)".to_string(), 0.75);
        parallelizability_by_complexity.insert("O(n^2)".to_string(), 0.9);

        let mut efficiency_curve = HashMap::new();
        for (n, eff) in [("1", 1.0), ("2", 0.95), ("4", 0.88), ("8", 0.75), ("16", 0.6), ("24", 0.5)] {
            efficiency_curve.insert(n.to_string(), eff);
        }

        let mut cores_cap_by_complexity = HashMap::new();
        cores_cap_by_complexity.insert("O(1)".to_string(), 1);
        cores_cap_by_complexity.insert("O(log n)".to_string(), 2);
        cores_cap_by_complexity.insert("O(n)".to_string(), 8);
        cores_cap_by_complexity.insert("O(n log n)".to_string(), 16);
        cores_cap_by_complexity.insert("O(n^2)".to_string(), 24);

        Self { parallelizability_by_complexity, efficiency_curve, cores_cap_by_complexity }
    }
}

/// Vectorization model (§4.4 S4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizationSpec {
    pub width_bits: f64,
    pub simd_efficiency: f64,
    pub vectorizability_ratio: HashMap<String, f64>,
}

impl Default for VectorizationSpec {
    fn default() -> Self {
        let mut vectorizability_ratio = HashMap::new();
        vectorizability_ratio.insert("compute".to_string(), 0.8);
        Self { width_bits: 256.0, simd_efficiency: 0.85, vectorizability_ratio }
    }
}

/// Hardware prefetch model (§4.4 S6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwarePrefetch {
    /// Per access-pattern accuracy: sequential, stride, pattern, random.
    pub pattern_accuracy: HashMap<String, f64>,
}

impl Default for HardwarePrefetch {
    fn default() -> Self {
        let mut pattern_accuracy = HashMap::new();
        pattern_accuracy.insert("sequential".to_string(), 0.95);
        pattern_accuracy.insert("stride".to_string(), 0.85);
        pattern_accuracy.insert("pattern".to_string(), 0.70);
        pattern_accuracy.insert("random".to_string(), 0.0);
        Self { pattern_accuracy }
    }
}

/// The CPU engine's full `engine_specific` typed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuSpecific {
    pub cache_behavior: CacheBehavior,
    pub thermal_behavior: ThermalBehavior,
    pub boost_behavior: BoostBehavior,
    pub numa_behavior: NumaBehavior,
    pub branch_prediction: BranchPrediction,
    pub memory_bandwidth: MemoryBandwidthContention,
    pub parallel_processing: ParallelProcessing,
    pub vectorization: VectorizationSpec,
    pub hardware_prefetch: HardwarePrefetch,
    /// Per-language performance factor (>1 means faster), keyed by language tag.
    pub language_performance: HashMap<String, f64>,
}

impl Default for CpuSpecific {
    fn default() -> Self {
        let mut language_performance = HashMap::new();
        for (lang, factor) in [("cpp", 1.0), ("rust", 1.0), ("go", 0.85), ("java", 0.75), ("python", 0.05), ("js", 0.3)] {
            language_performance.insert(lang.to_string(), factor);
        }
        Self {
            cache_behavior: CacheBehavior::default(),
            thermal_behavior: ThermalBehavior::default(),
            boost_behavior: BoostBehavior::default(),
            numa_behavior: NumaBehavior::default(),
            branch_prediction: BranchPrediction::default(),
            memory_bandwidth: MemoryBandwidthContention::default(),
            parallel_processing: ParallelProcessing::default(),
            vectorization: VectorizationSpec::default(),
            hardware_prefetch: HardwarePrefetch::default(),
            language_performance,
        }
    }
}
