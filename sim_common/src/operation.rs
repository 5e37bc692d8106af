//! The operation/result envelope (§3) flowing through every engine.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// The closed set of operation types understood across engine kinds.
///
/// Engine-private types (e.g. a storage engine's `Trim`) are carried in
/// `Other` so new domain operations don't require touching every engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Compute,
    MemoryRead,
    MemoryWrite,
    MemoryBarrier,
    MemoryAllocate,
    StorageRead,
    StorageWrite,
    StorageSeek,
    NetworkRequest,
    /// Engine-private operation type not in the closed set above.
    Other(String),
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Compute => write!(f, "compute"),
            OperationType::MemoryRead => write!(f, "memory_read"),
            OperationType::MemoryWrite => write!(f, "memory_write"),
            OperationType::MemoryBarrier => write!(f, "memory_barrier"),
            OperationType::MemoryAllocate => write!(f, "memory_allocate"),
            OperationType::StorageRead => write!(f, "storage_read"),
            OperationType::StorageWrite => write!(f, "storage_write"),
            OperationType::StorageSeek => write!(f, "storage_seek"),
            OperationType::NetworkRequest => write!(f, "network_request"),
            OperationType::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Algorithmic complexity class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplexityClass {
    #[serde(rename = "O(1)")]
    O1,
    #[serde(rename = "O(log n)")]
    OLogN,
    #[serde(rename = "O(n)")]
    ON,
    #[serde(rename = "O(n log n)")]
    ONLogN,
    #[serde(rename = "O(n^2)")]
    ON2,
}

impl ComplexityClass {
    /// Stable string key, used to index profile maps keyed by complexity.
    pub fn key(&self) -> &'static str {
        match self {
            ComplexityClass::O1 => "O(1)",
            ComplexityClass::OLogN => "O(log n)",
            ComplexityClass::ON => "O(n)",
            ComplexityClass::ONLogN => "O(n log n)",
            ComplexityClass::ON2 => "O(n^2)",
        }
    }

    /// Whether this complexity class scales with operation data size (S3).
    pub fn scales_with_size(&self) -> bool {
        matches!(self, ComplexityClass::ON | ComplexityClass::ONLogN | ComplexityClass::ON2)
    }

    /// Whether this complexity class is considered branch-heavy enough to
    /// run through the branch-prediction stage (S7).
    pub fn is_branch_heavy(&self) -> bool {
        !matches!(self, ComplexityClass::O1)
    }

    /// Relative computational weight, used by thermal/power modeling where
    /// heavier algorithmic classes are assumed to dissipate more heat per
    /// unit of work.
    pub fn weight(&self) -> f64 {
        match self {
            ComplexityClass::O1 => 1.0,
            ComplexityClass::OLogN => 1.5,
            ComplexityClass::ON => 2.0,
            ComplexityClass::ONLogN => 3.0,
            ComplexityClass::ON2 => 5.0,
        }
    }
}

/// Source-language tag of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Rust,
    Go,
    Java,
    Python,
    Js,
    Unknown,
}

impl Language {
    /// Whether this language is interpreted (relevant to branch-prediction S7).
    pub fn is_interpreted(&self) -> bool {
        matches!(self, Language::Python | Language::Js)
    }

    /// Profile key used to index `language_performance` maps.
    pub fn key(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Python => "python",
            Language::Js => "js",
            Language::Unknown => "unknown",
        }
    }
}

/// The unit of work flowing through an engine. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identity, assigned by the caller.
    pub id: String,
    /// Operation type (§3).
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Algorithmic complexity class.
    pub complexity: ComplexityClass,
    /// Source-language tag.
    pub language: Language,
    /// Size of the data this operation touches, in bytes.
    pub data_size: u64,
    /// Optional hint for where this operation should be routed after
    /// retirement, consulted by the wrapper's routing table.
    #[serde(default)]
    pub next_component: Option<String>,
    /// Opaque metadata, e.g. vectorizability hints or access-pattern tags.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Operation {
    /// Data size in kilobytes, used throughout the pipeline's log-scaling stages.
    pub fn data_size_kb(&self) -> f64 {
        self.data_size as f64 / 1024.0
    }

    /// Reads a boolean metadata flag, defaulting to `false` when absent or
    /// of the wrong type.
    pub fn metadata_flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Reads a string metadata value.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Performance grade assigned to a retired operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceGrade {
    A,
    B,
    C,
    D,
    F,
}

impl PerformanceGrade {
    /// Derive a grade from the ratio of actual to base latency.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 1.1 {
            PerformanceGrade::A
        } else if ratio <= 1.3 {
            PerformanceGrade::B
        } else if ratio <= 1.6 {
            PerformanceGrade::C
        } else if ratio <= 2.5 {
            PerformanceGrade::D
        } else {
            PerformanceGrade::F
        }
    }
}

/// Recommended follow-up action for a retired operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Continue,
    Throttle,
    Redirect,
}

impl RecommendedAction {
    /// Derive a recommendation from a grade and the engine's current health.
    pub fn from_grade_and_health(grade: PerformanceGrade, health: f64) -> Self {
        if health < 0.3 {
            RecommendedAction::Redirect
        } else if matches!(grade, PerformanceGrade::D | PerformanceGrade::F) {
            RecommendedAction::Throttle
        } else {
            RecommendedAction::Continue
        }
    }
}

/// Structured penalty breakdown attached to every retired operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyInformation {
    /// Latency before any penalty stage ran (S1's output).
    pub base_latency_ms: f64,
    /// Latency after the full pipeline ran.
    pub actual_latency_ms: f64,
    /// Multiplicative penalty from load (utilization).
    pub load_penalty: f64,
    /// Multiplicative penalty from queue pressure.
    pub queue_penalty: f64,
    /// Multiplicative penalty from thermal throttling.
    pub thermal_penalty: f64,
    /// Multiplicative penalty from bandwidth/resource contention.
    pub contention_penalty: f64,
    /// Multiplicative penalty from engine health degradation.
    pub health_penalty: f64,
    /// Letter grade derived from base vs. actual latency.
    pub grade: PerformanceGrade,
    /// Recommended follow-up action.
    pub recommended_action: RecommendedAction,
}

impl PenaltyInformation {
    /// Build penalty info from the pipeline's base/actual latencies and the
    /// individual multiplicative factors collected along the way.
    pub fn build(
        base_latency_ms: f64,
        actual_latency_ms: f64,
        load_penalty: f64,
        queue_penalty: f64,
        thermal_penalty: f64,
        contention_penalty: f64,
        health_penalty: f64,
        health: f64,
    ) -> Self {
        let ratio = if base_latency_ms > 0.0 {
            actual_latency_ms / base_latency_ms
        } else {
            1.0
        };
        let grade = PerformanceGrade::from_ratio(ratio);
        let recommended_action = RecommendedAction::from_grade_and_health(grade, health);
        Self {
            base_latency_ms,
            actual_latency_ms,
            load_penalty,
            queue_penalty,
            thermal_penalty,
            contention_penalty,
            health_penalty,
            grade,
            recommended_action,
        }
    }
}

/// A retired operation's record, emitted by `Engine::process_tick`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// Identity copied from the originating operation.
    pub id: String,
    /// Operation type copied from the originating operation.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Original processing-time duration predicted by the pipeline, in ms.
    pub processing_time_ms: f64,
    /// Tick at which the operation retired.
    pub completion_tick: u64,
    /// Whether the operation completed successfully.
    pub success: bool,
    /// Routing hint copied from the originating operation.
    pub next_component: Option<String>,
    /// Structured penalty breakdown.
    pub penalty_info: PenaltyInformation,
    /// Unstructured diagnostic metrics (cache hit level, cores used, etc.).
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
}

/// A heap entry: an admitted operation in flight, holding resource units
/// until its completion tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOperation {
    /// The admitted operation.
    pub operation: Operation,
    /// Tick at which the operation was admitted.
    pub start_tick: u64,
    /// Tick at which the operation will retire.
    pub completion_tick: u64,
    /// Number of resource units (cores/channels/IOPS slots) held.
    pub resource_units: u32,
    /// Monotonic insertion sequence, used to break completion-tick ties
    /// in FIFO order (§3: "ties broken by insertion order").
    pub sequence: u64,
    /// Predicted latency in ms, carried through to build the `OperationResult`.
    pub latency_ms: f64,
    /// Penalty breakdown accumulated while computing `latency_ms`.
    pub penalty_info: PenaltyInformation,
}

impl ProcessingOperation {
    /// Compute a completion tick from a start tick and a predicted latency,
    /// given a tick duration. Quantizes latency to whole ticks (ceil, min 1).
    pub fn completion_tick_for(start_tick: u64, latency_ms: f64, tick_duration_ns: u64) -> u64 {
        let tick_duration_ms = tick_duration_ns as f64 / 1_000_000.0;
        let ticks = (latency_ms / tick_duration_ms).ceil().max(1.0) as u64;
        start_tick + ticks
    }
}

impl PartialEq for ProcessingOperation {
    fn eq(&self, other: &Self) -> bool {
        self.completion_tick == other.completion_tick && self.sequence == other.sequence
    }
}
impl Eq for ProcessingOperation {}

impl Ord for ProcessingOperation {
    // Min-heap on completion_tick, ties broken by insertion order. Reversed
    // so `BinaryHeap` (a max-heap) pops the smallest completion_tick first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .completion_tick
            .cmp(&self.completion_tick)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for ProcessingOperation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

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

    fn penalty() -> PenaltyInformation {
        PenaltyInformation::build(1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0)
    }

    #[test]
    fn heap_orders_by_completion_tick_ascending() {
        let mut heap = BinaryHeap::new();
        heap.push(ProcessingOperation {
            operation: op("a"),
            start_tick: 0,
            completion_tick: 10,
            resource_units: 1,
            sequence: 0,
            latency_ms: 1.0,
            penalty_info: penalty(),
        });
        heap.push(ProcessingOperation {
            operation: op("b"),
            start_tick: 0,
            completion_tick: 5,
            resource_units: 1,
            sequence: 1,
            latency_ms: 1.0,
            penalty_info: penalty(),
        });
        heap.push(ProcessingOperation {
            operation: op("c"),
            start_tick: 0,
            completion_tick: 5,
            resource_units: 1,
            sequence: 2,
            latency_ms: 1.0,
            penalty_info: penalty(),
        });

        assert_eq!(heap.pop().unwrap().operation.id, "b");
        assert_eq!(heap.pop().unwrap().operation.id, "c");
        assert_eq!(heap.pop().unwrap().operation.id, "a");
    }

    #[test]
    fn completion_tick_quantizes_ceil_min_one() {
        assert_eq!(ProcessingOperation::completion_tick_for(0, 0.001, 10_000), 1);
        assert_eq!(ProcessingOperation::completion_tick_for(0, 0.08, 10_000), 8);
        assert_eq!(ProcessingOperation::completion_tick_for(5, 0.081, 10_000), 5 + 9);
    }

    #[test]
    fn grade_from_ratio_buckets() {
        assert_eq!(PerformanceGrade::from_ratio(1.0), PerformanceGrade::A);
        assert_eq!(PerformanceGrade::from_ratio(1.2), PerformanceGrade::B);
        assert_eq!(PerformanceGrade::from_ratio(1.5), PerformanceGrade::C);
        assert_eq!(PerformanceGrade::from_ratio(2.0), PerformanceGrade::D);
        assert_eq!(PerformanceGrade::from_ratio(5.0), PerformanceGrade::F);
    }
}
