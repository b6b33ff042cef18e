//! BatchRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Async runtimes
//! - Timers or channels
//! - Task body backends
//!
//! All types here describe a batch of tasks and the outcomes it produces.

pub mod error;
pub mod ids;
pub mod outcome;
pub mod status;
pub mod summary;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::TaskId;
pub use outcome::{Outcome, DEADLINE_EXCEEDED, DOMAIN_FAILURE};
pub use status::{BatchPhase, OutcomeStatus, RunnerPhase};
pub use summary::BatchSummary;
pub use task::TaskSpec;
