//! Common re-exports for convenience.

pub use crate::complexity::{ComplexityLevel, ComplexitySet, EngineKind};
pub use crate::config::SimConfig;
pub use crate::error::{SimError, SimResult};
pub use crate::operation::{
    ComplexityClass, Language, Operation, OperationResult, OperationType, PenaltyInformation,
    PerformanceGrade, ProcessingOperation, RecommendedAction,
};
pub use crate::profile::store::ProfileStore;
pub use crate::profile::EngineProfile;
