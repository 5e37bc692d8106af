//! Core allocation (§4.4.2) feeding the parallel-processing stage (S8).

use sim_common::operation::Operation;
use sim_common::profile::cpu::ParallelProcessing;

/// Amdahl's law speedup for a parallel fraction `p` run across `n` units.
pub fn amdahl_speedup(p: f64, n: u32) -> f64 {
    if n == 0 {
        return 1.0;
    }
    1.0 / ((1.0 - p) + p / n as f64)
}

fn efficiency_for(curve: &std::collections::HashMap<String, f64>, n: u32) -> f64 {
    curve.get(&n.to_string()).copied().unwrap_or(1.0)
}

/// Data-size band per §4.4.2's thresholds: a hard cores cap below 64 kB,
/// or a multiplier above it ("huge data → 1.5x factor").
enum DataSizeBand {
    /// Forced to exactly one core.
    ForceSingleCore,
    /// Hard cap on the number of cores.
    Cap(u32),
    /// Multiply the otherwise-chosen core count by this factor.
    Multiplier(f64),
}

fn data_size_band(data_size: u64) -> DataSizeBand {
    if data_size < 4 * 1024 {
        DataSizeBand::ForceSingleCore
    } else if data_size < 16 * 1024 {
        DataSizeBand::Cap(2)
    } else if data_size < 32 * 1024 {
        DataSizeBand::Cap(4)
    } else if data_size < 64 * 1024 {
        DataSizeBand::Cap(8)
    } else {
        DataSizeBand::Multiplier(1.5)
    }
}

/// Compute the number of cores an operation needs, per §4.4.2:
/// find the largest N such that per-core efficiency stays within 70% of the
/// best seen so far, then clamp by the data-size band and the
/// per-complexity cap from the profile.
pub fn cores_needed(op: &Operation, total_cores: u32, parallel: &ParallelProcessing) -> u32 {
    let p = parallel
        .parallelizability_by_complexity
        .get(op.complexity.key())
        .copied()
        .unwrap_or(0.0);

    if p <= 0.0 || total_cores <= 1 {
        return 1;
    }

    let band = data_size_band(op.data_size);
    if matches!(band, DataSizeBand::ForceSingleCore) {
        return 1;
    }

    let mut best_per_core = 0.0f64;
    let mut chosen = 1u32;
    for n in 1..=total_cores {
        let speedup = amdahl_speedup(p, n) * efficiency_for(&parallel.efficiency_curve, n);
        let per_core = speedup / n as f64;
        if per_core > best_per_core {
            best_per_core = per_core;
        }
        if per_core >= 0.7 * best_per_core {
            chosen = n;
        }
    }

    let complexity_cap = parallel.cores_cap_by_complexity.get(op.complexity.key()).copied().unwrap_or(total_cores);
    chosen = chosen.min(complexity_cap);

    match band {
        DataSizeBand::ForceSingleCore => unreachable!(),
        DataSizeBand::Cap(cap) => chosen.min(cap),
        DataSizeBand::Multiplier(factor) => ((chosen as f64 * factor).round() as u32).min(total_cores),
    }
    .clamp(1, total_cores)
}

/// Cap a raw speedup at `min(cores_used, 1/(1-p))`, matching invariant 8.
pub fn capped_speedup(p: f64, cores_used: u32, raw_speedup: f64) -> f64 {
    let hard_cap = if p < 1.0 { 1.0 / (1.0 - p) } else { f64::MAX };
    raw_speedup.min(cores_used as f64).min(hard_cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_common::operation::ComplexityClass;
    use std::collections::HashMap;

    fn op(data_size: u64, complexity: ComplexityClass) -> Operation {
        Operation {
            id: "x".into(),
            op_type: sim_common::operation::OperationType::Compute,
            complexity,
            language: sim_common::operation::Language::Rust,
            data_size,
            next_component: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn small_data_forces_single_core() {
        let parallel = ParallelProcessing::default();
        let op = op(1024, ComplexityClass::ON);
        assert_eq!(cores_needed(&op, 24, &parallel), 1);
    }

    #[test]
    fn o1_never_parallelizes() {
        let parallel = ParallelProcessing::default();
        let op = op(100_000, ComplexityClass::O1);
        assert_eq!(cores_needed(&op, 24, &parallel), 1);
    }

    #[test]
    fn capped_speedup_never_exceeds_cores_used() {
        assert!(capped_speedup(0.9, 4, 100.0) <= 4.0);
    }

    #[test]
    fn amdahl_speedup_is_bounded_by_one_over_one_minus_p() {
        let s = amdahl_speedup(0.9, 1_000_000);
        assert!(s <= 10.0 + 1e-9);
    }
}
