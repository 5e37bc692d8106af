//! Cache hierarchy (§4.4.1, stage S5).

use crate::base::op_hash_fraction;
use sim_common::operation::Operation;
use sim_common::profile::cpu::CacheBehavior;

/// Mutable per-level cache state: current hit ratio and accumulated working set.
#[derive(Debug, Clone)]
pub struct CacheLevelState {
    pub name: String,
    pub target_hit_ratio: f64,
    pub current_hit_ratio: f64,
    pub size_kb: f64,
    pub multiplier: f64,
}

/// The CPU's full cache hierarchy state, owned by the engine.
#[derive(Debug, Clone)]
pub struct CacheState {
    pub levels: Vec<CacheLevelState>,
    pub memory_multiplier: f64,
    pub cold_start_ratio: f64,
    pub pressure_factor: f64,
    pub warmup_operations: u32,
    pub working_set_kb: f64,
    pub operations_seen: u32,
}

impl CacheState {
    pub fn from_profile(behavior: &CacheBehavior) -> Self {
        let levels = behavior
            .levels
            .iter()
            .map(|l| CacheLevelState {
                name: l.name.clone(),
                target_hit_ratio: l.target_hit_ratio,
                current_hit_ratio: behavior.cold_start_ratio,
                size_kb: l.size_kb,
                multiplier: l.multiplier,
            })
            .collect();
        Self {
            levels,
            memory_multiplier: behavior.memory_multiplier,
            cold_start_ratio: behavior.cold_start_ratio,
            pressure_factor: behavior.pressure_factor,
            warmup_operations: behavior.warmup_operations,
            working_set_kb: 0.0,
            operations_seen: 0,
        }
    }

    fn total_cache_size_kb(&self) -> f64 {
        self.levels.iter().map(|l| l.size_kb).sum()
    }

    /// Advance every level's current ratio one operation closer to its
    /// target, per the warmup/pressure rule in §4.4.1.
    fn advance_ratios(&mut self) {
        let total = self.total_cache_size_kb();
        let pressure_factor = self.pressure_factor;
        let working_set_kb = self.working_set_kb;
        for level in &mut self.levels {
            if self.operations_seen < self.warmup_operations {
                let t = self.operations_seen as f64 / self.warmup_operations.max(1) as f64;
                level.current_hit_ratio = self.cold_start_ratio + (level.target_hit_ratio - self.cold_start_ratio) * t;
            } else {
                let pressure = if total > 0.0 { working_set_kb / total * pressure_factor } else { 0.0 };
                level.current_hit_ratio = (level.target_hit_ratio * (1.0 - pressure)).clamp(0.1, 0.98);
            }
        }
    }

    /// Grow the working set by an admitted operation's data size; evict 20%
    /// (LRU-proxy) once it exceeds the total cache size.
    fn grow_working_set(&mut self, data_size_kb: f64) {
        self.working_set_kb += data_size_kb;
        let total = self.total_cache_size_kb();
        if self.working_set_kb > total {
            self.working_set_kb *= 0.8;
        }
    }

    /// Determine the hit level for `op`, mutating ratio/working-set state
    /// as a side effect of having processed one more operation.
    ///
    /// Returns `Some(level_name)` on a hit, `None` on a total miss (caller
    /// applies `memory_multiplier`).
    pub fn determine_hit(&mut self, op: &Operation) -> Option<String> {
        self.advance_ratios();
        self.operations_seen = self.operations_seen.saturating_add(1);

        let data_size_kb = op.data_size_kb();
        let mut result = None;
        for (idx, level) in self.levels.iter().enumerate() {
            if data_size_kb > level.size_kb {
                continue; // physical constraint: too big for this level, automatic miss
            }
            let fraction = op_hash_fraction(op, 0x5A1E_0000 + idx as u64);
            if fraction < level.current_hit_ratio {
                result = Some(level.name.clone());
                break;
            }
        }

        self.grow_working_set(data_size_kb);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_common::operation::{ComplexityClass, Language, OperationType};
    use std::collections::HashMap;

    fn op(data_size: u64) -> Operation {
        Operation {
            id: "op-1".into(),
            op_type: OperationType::Compute,
            complexity: ComplexityClass::O1,
            language: Language::Go,
            data_size,
            next_component: None,
            metadata: HashMap::new(),
        }
    }

    fn state_with_ratio(ratio: f64) -> CacheState {
        CacheState {
            levels: vec![
                CacheLevelState { name: "L1".into(), target_hit_ratio: ratio, current_hit_ratio: ratio, size_kb: 32.0, multiplier: 1.0 },
                CacheLevelState { name: "L2".into(), target_hit_ratio: ratio, current_hit_ratio: ratio, size_kb: 1024.0, multiplier: 1.2 },
            ],
            memory_multiplier: 8.0,
            cold_start_ratio: ratio,
            pressure_factor: 0.3,
            warmup_operations: 0,
            working_set_kb: 0.0,
            operations_seen: 0,
        }
    }

    #[test]
    fn ratio_of_one_always_hits_first_level() {
        let mut state = state_with_ratio(1.0);
        let hit = state.determine_hit(&op(100));
        assert_eq!(hit.as_deref(), Some("L1"));
    }

    #[test]
    fn ratio_of_zero_is_a_total_miss() {
        let mut state = state_with_ratio(0.0);
        let hit = state.determine_hit(&op(100));
        assert_eq!(hit, None);
    }

    #[test]
    fn oversized_operation_skips_the_level() {
        let mut state = state_with_ratio(1.0);
        // Bigger than L1 (32 KB) and L2 (1024 KB) both, in bytes.
        let hit = state.determine_hit(&op(2_000_000));
        assert_eq!(hit, None);
    }

    #[test]
    fn working_set_evicts_past_total_capacity() {
        let mut state = state_with_ratio(0.5);
        state.grow_working_set(2000.0); // > 32 + 1024 total
        assert!(state.working_set_kb < 2000.0);
    }
}
