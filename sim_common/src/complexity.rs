//! Complexity interface (C2) — a pure function from complexity level and
//! engine kind to a set of enabled pipeline feature flags.
//!
//! Invariant: the feature set at level *k* is a superset of level *k-1*,
//! for every engine kind.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Engine kind, used both by the profile store and the complexity interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Cpu,
    Memory,
    Storage,
    Network,
}

impl EngineKind {
    /// Directory name this kind's profiles live under (§6).
    pub fn dir_name(&self) -> &'static str {
        match self {
            EngineKind::Cpu => "cpu",
            EngineKind::Memory => "memory",
            EngineKind::Storage => "storage",
            EngineKind::Network => "network",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Complexity level, 0..3. Each pipeline stage is consulted against the
/// feature set this level maps to before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComplexityLevel {
    Minimal = 0,
    Basic = 1,
    Advanced = 2,
    Maximum = 3,
}

impl ComplexityLevel {
    /// Parse a raw level, falling back to `Advanced` (the documented safe
    /// default, §7) and a warning on out-of-range input.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => ComplexityLevel::Minimal,
            1 => ComplexityLevel::Basic,
            2 => ComplexityLevel::Advanced,
            3 => ComplexityLevel::Maximum,
            other => {
                tracing::warn!(level = other, "invalid complexity level, falling back to Advanced");
                ComplexityLevel::Advanced
            }
        }
    }

    /// All levels in ascending order, for invariant tests.
    pub fn all() -> [ComplexityLevel; 4] {
        [
            ComplexityLevel::Minimal,
            ComplexityLevel::Basic,
            ComplexityLevel::Advanced,
            ComplexityLevel::Maximum,
        ]
    }
}

/// The set of feature names enabled for a given (level, kind) pair, plus any
/// manual overrides applied on top.
#[derive(Debug, Clone, Default)]
pub struct ComplexitySet {
    enabled: HashSet<&'static str>,
}

impl ComplexitySet {
    /// Whether the named feature is enabled. Unknown names are treated as
    /// disabled and logged, per §4.2.
    pub fn should_enable(&self, name: &str) -> bool {
        let found = self.enabled.iter().any(|f| *f == name);
        if !found && !KNOWN_FEATURES.contains(&name) {
            tracing::warn!(feature = name, "querying unknown complexity feature");
        }
        found
    }

    /// Manually enable a feature, independent of the configured level.
    pub fn enable(&mut self, name: &'static str) {
        self.enabled.insert(name);
    }

    /// Manually disable a feature, independent of the configured level.
    pub fn disable(&mut self, name: &'static str) {
        self.enabled.remove(name);
    }

    /// Symmetric difference of enabled features between two sets.
    pub fn diff(&self, other: &ComplexitySet) -> HashSet<&'static str> {
        self.enabled.symmetric_difference(&other.enabled).copied().collect()
    }
}

const KNOWN_FEATURES: &[&str] = &[
    "language_multiplier",
    "complexity_scaling",
    "vectorization",
    "cache_hierarchy",
    "advanced_prefetch",
    "branch_prediction",
    "parallel_processing",
    "boost_clocks",
    "numa",
    "bandwidth_contention",
    "thermal_throttling",
    "common_factors",
    "ddr_timing",
    "bank_conflicts",
    "memory_ordering",
    "memory_barrier_stalls",
    "ecc",
    "power_states",
    "tlb_page_walk",
    "virtual_memory",
    "iops_limits",
    "queue_depth",
    "pattern_optimization",
    "controller_cache",
    "trim_gc",
    "fragmentation",
    "wear_leveling",
    "storage_thermal",
    "compression",
    "encryption",
    "multi_stream",
    "zoned_storage",
    "bandwidth_limits",
    "protocol_overhead",
    "congestion",
    "packet_loss",
    "jitter",
    "qos",
    "geo_latency",
    "topology",
];

/// Features enabled at each level, per engine kind. Built so that level
/// *k* is exactly the union of level *k-1* plus that level's additions —
/// this is what makes the superset invariant hold by construction.
pub fn feature_set(level: ComplexityLevel, kind: EngineKind) -> ComplexitySet {
    let tiers = tiers_for(kind);
    let mut enabled = HashSet::new();
    for tier in tiers.iter().take(level as usize + 1) {
        for feature in *tier {
            enabled.insert(*feature);
        }
    }
    ComplexitySet { enabled }
}

/// Per-kind, per-level additive feature tiers. Index 0 = Minimal's
/// additions, index 3 = Maximum's additions.
fn tiers_for(kind: EngineKind) -> [&'static [&'static str]; 4] {
    match kind {
        EngineKind::Cpu => [
            &["language_multiplier", "complexity_scaling", "cache_hierarchy"],
            &["common_factors"],
            &["vectorization", "parallel_processing", "boost_clocks", "numa"],
            &["advanced_prefetch", "branch_prediction", "bandwidth_contention", "thermal_throttling"],
        ],
        EngineKind::Memory => [
            &["ddr_timing", "complexity_scaling"],
            &["bank_conflicts", "common_factors"],
            &["memory_ordering", "memory_barrier_stalls", "virtual_memory"],
            &["ecc", "power_states", "tlb_page_walk"],
        ],
        EngineKind::Storage => [
            &["iops_limits", "queue_depth"],
            &["pattern_optimization", "common_factors"],
            &["controller_cache", "trim_gc", "fragmentation"],
            &["wear_leveling", "storage_thermal", "compression", "encryption", "multi_stream", "zoned_storage"],
        ],
        EngineKind::Network => [
            &["bandwidth_limits", "protocol_overhead"],
            &["congestion", "common_factors"],
            &["packet_loss", "jitter", "qos"],
            &["geo_latency", "topology"],
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_nested_supersets_for_every_kind() {
        for kind in [EngineKind::Cpu, EngineKind::Memory, EngineKind::Storage, EngineKind::Network] {
            let mut prev: Option<ComplexitySet> = None;
            for level in ComplexityLevel::all() {
                let set = feature_set(level, kind);
                if let Some(p) = &prev {
                    for f in &p.enabled {
                        assert!(set.enabled.contains(f), "{kind} level {level:?} lost feature {f}");
                    }
                }
                prev = Some(set);
            }
        }
    }

    #[test]
    fn invalid_level_falls_back_to_advanced() {
        assert_eq!(ComplexityLevel::from_raw(99), ComplexityLevel::Advanced);
        assert_eq!(ComplexityLevel::from_raw(2), ComplexityLevel::Advanced);
    }

    #[test]
    fn manual_override_independent_of_level() {
        let mut set = feature_set(ComplexityLevel::Minimal, EngineKind::Cpu);
        assert!(!set.should_enable("thermal_throttling"));
        set.enable("thermal_throttling");
        assert!(set.should_enable("thermal_throttling"));
        set.disable("thermal_throttling");
        assert!(!set.should_enable("thermal_throttling"));
    }
}
