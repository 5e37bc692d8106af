//! Error taxonomy for the simulator (§7).
//!
//! Queue-full and heap-full are expected operating conditions surfaced as
//! typed backpressure signals, never a reason to abort the actor. Invalid
//! complexity/feature values fall back to a safe default and emit a
//! warning rather than erroring — see `complexity::ComplexityLevel::safe_default`.

use thiserror::Error;

/// Error type for all simulator operations.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    /// A profile file failed to parse or is missing required fields.
    #[error("invalid profile {path}: {reason}")]
    InvalidProfile {
        /// Path (or logical name) of the offending profile.
        path: String,
        /// Human-readable reason.
        reason: String,
    },

    /// An explicit profile lookup by (kind, name) found nothing.
    #[error("profile not found: {kind}/{name}")]
    ProfileNotFound {
        /// Engine kind the lookup was scoped to.
        kind: String,
        /// Requested profile name.
        name: String,
    },

    /// A complexity level outside 0..3 was requested.
    #[error("invalid complexity level: {0}")]
    InvalidComplexityLevel(i64),

    /// A bounded queue rejected an admission because it is at capacity.
    #[error("queue full (capacity {capacity})")]
    QueueFull {
        /// The queue's configured capacity.
        capacity: usize,
    },

    /// The in-flight heap rejected an admission because it is at capacity.
    #[error("heap full (capacity {capacity})")]
    HeapFull {
        /// The heap's configured capacity.
        capacity: usize,
    },

    /// `process_tick` did not complete within the configured timeout.
    #[error("tick timed out after {0:?}")]
    TickTimeout(std::time::Duration),

    /// A pause request did not complete within the configured timeout.
    #[error("pause timed out after {0:?}")]
    PauseTimeout(std::time::Duration),

    /// A resume request did not complete within the configured timeout.
    #[error("resume timed out after {0:?}")]
    ResumeTimeout(std::time::Duration),

    /// Snapshot save/restore failed (I/O or (de)serialization).
    #[error("snapshot I/O error: {0}")]
    SnapshotIO(String),

    /// `Start` was called on a wrapper that is already running.
    #[error("wrapper is already running")]
    AlreadyRunning,

    /// An operation requiring the wrapper to be running was attempted while stopped.
    #[error("wrapper is not running")]
    NotRunning,

    /// `Pause` was called on a wrapper that is already paused.
    #[error("wrapper is already paused")]
    AlreadyPaused,

    /// `Resume` was called on a wrapper that is not paused.
    #[error("wrapper is not paused")]
    NotPaused,

    /// A routing table entry named a destination the wrapper does not recognize.
    #[error("unknown routing destination: {0}")]
    UnknownDestination(String),
}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        SimError::SnapshotIO(e.to_string())
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::SnapshotIO(e.to_string())
    }
}

/// Convenience result alias.
pub type SimResult<T> = Result<T, SimError>;
