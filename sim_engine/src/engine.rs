//! The common engine trait (§4.5) every domain pipeline implements, so the
//! wrapper (C6) is generic over which kind of hardware it drives.

use sim_common::complexity::ComplexityLevel;
use sim_common::error::SimResult;
use sim_common::operation::{Operation, OperationResult};
use sim_common::profile::EngineProfile;

/// Shared public shape of a CPU/memory/storage/network engine.
///
/// `process_operation` runs the staged pipeline in isolation, without
/// touching the engine's internal queue or in-flight heap — useful for
/// benchmarks and per-stage tests. `process_tick` is what the wrapper
/// actually drives: it retires completed in-flight operations and admits
/// queued ones for the given tick.
pub trait Engine {
    /// Queue an operation for admission on a future tick. Errors with
    /// `QueueFull` if the engine's internal queue is at capacity.
    fn queue_operation(&mut self, op: Operation) -> SimResult<()>;

    /// Number of operations currently queued (not yet admitted).
    fn queue_length(&self) -> usize;

    /// Configured capacity of the internal queue.
    fn capacity(&self) -> usize;

    /// Fraction of resource units (cores/channels/IOPS slots/bandwidth)
    /// currently busy, in `[0, 1]`.
    fn utilization(&self) -> f64;

    /// Current health score, in `[0, 1]`.
    fn health(&self) -> f64;

    /// Reconfigure the active feature set for a new complexity level.
    fn set_complexity_level(&mut self, level: ComplexityLevel);

    /// Replace the engine's hardware profile. Errors if the profile's kind
    /// doesn't match this engine.
    fn load_profile(&mut self, profile: EngineProfile) -> SimResult<()>;

    /// Run the staged pipeline for a single operation starting at `tick`,
    /// without touching the queue or in-flight heap.
    fn process_operation(&mut self, op: &Operation, tick: u64) -> SimResult<OperationResult>;

    /// Advance the engine by one tick: retire completed in-flight
    /// operations, then admit queued operations up to the configured
    /// per-tick limit and free resource capacity.
    fn process_tick(&mut self, tick: u64) -> SimResult<Vec<OperationResult>>;

    /// Serialize the engine's internal state (cache ratios, thermal,
    /// boost, in-flight heap, counters, ...) to an opaque JSON value for
    /// the wrapper's snapshot.
    fn get_dynamic_state(&self) -> serde_json::Value;

    /// Restore internal state previously produced by `get_dynamic_state`.
    fn load_dynamic_state(&mut self, state: serde_json::Value) -> SimResult<()>;

    /// Reset the engine to its post-`load_profile` state: empty queue and
    /// heap, full health, ambient temperature, zero counters.
    fn reset(&mut self);
}
