//! Common engine base (C3) — the queues, history, health model and
//! common-factors stage shared by every engine kind.

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_common::error::{SimError, SimResult};
use sim_common::operation::Operation;
use std::collections::VecDeque;

/// Deterministic FNV-1a + multiplicative hash over an operation's identity
/// fields, combined with a per-call salt (§4.4.1). Used for cache-hit
/// determination and, in this implementation, for every other "should this
/// probabilistic event happen" decision (NUMA locality, branch
/// misprediction, access-pattern classification) so that the simulator's
/// only seeded, genuinely-random source is the common-factors variance
/// stage (§9).
pub fn op_hash_fraction(op: &Operation, salt: u64) -> f64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET ^ salt;
    for byte in op.id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in op.op_type.to_string().as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash ^= op.complexity.key().len() as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash ^= op.language.key().len() as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    hash ^= op.data_size;
    hash = hash.wrapping_mul(FNV_PRIME);

    // Multiplicative step (Knuth's constant) spreads the FNV output further
    // before reducing to [0, 1).
    let spread = hash.wrapping_mul(2654435761);
    (spread >> 11) as f64 / (1u64 << 53) as f64
}

/// Bounded, FIFO operation queue shared by every engine's internal
/// "engine queue" (distinct from the wrapper's inbox, §4.6).
#[derive(Debug)]
pub struct BoundedQueue {
    items: VecDeque<Operation>,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self { items: VecDeque::with_capacity(capacity.min(1024)), capacity }
    }

    pub fn push_back(&mut self, op: Operation) -> SimResult<()> {
        if self.items.len() >= self.capacity {
            return Err(SimError::QueueFull { capacity: self.capacity });
        }
        self.items.push_back(op);
        Ok(())
    }

    /// Push back at the head — used to preserve ordering when an admission
    /// fails due to insufficient resource units (§5).
    pub fn push_front(&mut self, op: Operation) {
        self.items.push_front(op);
    }

    pub fn pop_front(&mut self) -> Option<Operation> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.items.iter()
    }
}

/// Fixed-capacity ring buffer of recent per-operation latencies, used for
/// variance/convergence diagnostics.
#[derive(Debug)]
pub struct HistoryRing {
    items: VecDeque<f64>,
    capacity: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self { items: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    pub fn push(&mut self, latency_ms: f64) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(latency_ms);
    }

    pub fn mean(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.items.iter().sum::<f64>() / self.items.len() as f64
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Health model: a score in [0, 1] that decays toward a utilization-derived
/// target via an exponential moving average, feeding the health-penalty
/// multiplier and the recommended-action heuristic.
#[derive(Debug)]
pub struct HealthModel {
    score: f64,
    ema_alpha: f64,
}

impl HealthModel {
    pub fn new() -> Self {
        Self { score: 1.0, ema_alpha: 0.1 }
    }

    /// Advance the health model by one tick given the current utilization.
    pub fn update(&mut self, utilization: f64) {
        let target = (1.0 - utilization * 0.6).clamp(0.0, 1.0);
        self.score = self.score + self.ema_alpha * (target - self.score);
        self.score = self.score.clamp(0.0, 1.0);
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn reset(&mut self) {
        self.score = 1.0;
    }
}

impl Default for HealthModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state composed into every engine: queue, history, health,
/// seeded variance, insertion sequence counter, and the one undocumented
/// knob (§9) — cache pressure factor.
pub struct EngineBase {
    pub queue: BoundedQueue,
    pub history: HistoryRing,
    pub health: HealthModel,
    pub pressure_factor: f64,
    pub tick_duration_ns: u64,
    rng: ChaCha8Rng,
    sequence: u64,
    pub total_operations: u64,
    pub completed_operations: u64,
    pub failed_operations: u64,
}

impl EngineBase {
    pub fn new(queue_capacity: usize, history_capacity: usize, tick_duration_ns: u64, seed: u64, pressure_factor: f64) -> Self {
        Self {
            queue: BoundedQueue::new(queue_capacity),
            history: HistoryRing::new(history_capacity),
            health: HealthModel::new(),
            pressure_factor,
            tick_duration_ns,
            rng: ChaCha8Rng::seed_from_u64(seed),
            sequence: 0,
            total_operations: 0,
            completed_operations: 0,
            failed_operations: 0,
        }
    }

    pub fn next_sequence(&mut self) -> u64 {
        let s = self.sequence;
        self.sequence += 1;
        s
    }

    /// Multiplicative load-factor penalty, increasing with utilization.
    pub fn load_factor(&self, utilization: f64) -> f64 {
        1.0 + utilization.clamp(0.0, 1.0) * 0.5
    }

    /// Multiplicative queue-pressure penalty, increasing as the engine
    /// queue fills up.
    pub fn queue_pressure_factor(&self) -> f64 {
        let ratio = if self.queue.capacity() == 0 {
            0.0
        } else {
            self.queue.len() as f64 / self.queue.capacity() as f64
        };
        1.0 + ratio.clamp(0.0, 1.0) * 0.3
    }

    /// Multiplicative health penalty: 1.0 at full health, up to 2.0 at
    /// zero health.
    pub fn health_penalty_factor(&self) -> f64 {
        2.0 - self.health.score()
    }

    /// Seedable Gaussian-like variance, the only genuinely-random stage in
    /// the pipeline (§9). Clamped to a tight band so it perturbs, but never
    /// dominates, the predicted latency.
    pub fn variance_factor(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(0.0001..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (1.0 + z * 0.03).clamp(0.9, 1.1)
    }

    pub fn reset(&mut self, queue_capacity: usize, history_capacity: usize) {
        self.queue = BoundedQueue::new(queue_capacity);
        self.history = HistoryRing::new(history_capacity);
        self.health.reset();
        self.total_operations = 0;
        self.completed_operations = 0;
        self.failed_operations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_common::operation::{ComplexityClass, Language, OperationType};
    use std::collections::HashMap;

    fn op(id: &str) -> Operation {
        Operation {
            id: id.to_string(),
            op_type: OperationType::Compute,
            complexity: ComplexityClass::O1,
            language: Language::Rust,
            data_size: 100,
            next_component: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn hash_is_deterministic_for_same_operation_and_salt() {
        let a = op_hash_fraction(&op("x"), 7);
        let b = op_hash_fraction(&op("x"), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_across_salts() {
        let a = op_hash_fraction(&op("x"), 1);
        let b = op_hash_fraction(&op("x"), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_within_unit_interval() {
        for salt in 0..20u64 {
            let f = op_hash_fraction(&op("y"), salt);
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn bounded_queue_rejects_when_full() {
        let mut q = BoundedQueue::new(2);
        q.push_back(op("a")).unwrap();
        q.push_back(op("b")).unwrap();
        let err = q.push_back(op("c")).unwrap_err();
        assert!(matches!(err, SimError::QueueFull { capacity: 2 }));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn variance_is_seed_reproducible() {
        let mut a = EngineBase::new(10, 10, 10_000, 42, 0.3);
        let mut b = EngineBase::new(10, 10, 10_000, 42, 0.3);
        for _ in 0..5 {
            assert_eq!(a.variance_factor(), b.variance_factor());
        }
    }
}
