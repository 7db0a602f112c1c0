//! Workflow Engine (C6)
//!
//! Ties trigger detection, query formulation, source fan-out, resolution
//! generation, and evaluation together into a single bounded-retry state
//! machine, with single-flight enforcement per conversation.

pub mod engine;
pub mod singleflight;
pub mod state;

pub use engine::{CancellationHandle, RunOutcome, WorkflowEngine, WorkflowError};
pub use singleflight::{SingleFlightError, SingleFlightGuard, SingleFlightRegistry};
pub use state::{TransitionError, WorkflowPhase, WorkflowState, WorkflowTransition};
