//! Persistent state for the rep assistance orchestrator
//!
//! This module provides RocksDB-backed persistent storage for:
//! - Conversations and their append-only message history
//! - WorkflowRuns and the RunAttempts sealed within them
//! - Resolutions promoted from a successful attempt, pending rep approval
//! - Event history for replay and debugging
//!
//! # Architecture
//!
//! The state store uses RocksDB column families to logically separate
//! different data types while sharing a single database instance:
//!
//! - `conversations`: Conversation records
//! - `messages`: append-only Message history, keyed by sequence
//! - `runs`: WorkflowRun records
//! - `attempts`: RunAttempt records, keyed by (run id, attempt index)
//! - `resolutions`: Resolution records
//! - `events`: workflow event history for replay
//!
//! # Usage
//!
//! ```ignore
//! use rep_orchestrator::state::{StateStore, Conversation, Channel};
//!
//! let store = StateStore::open("./orchestrator-state")?;
//! let conversation = Conversation::new("c1", "rep-42", Channel::Chat);
//! store.put_conversation(&conversation)?;
//! ```

pub mod schema;
pub mod store;
pub mod types;

pub use store::{SharedStateStore, StateStore, StoreError, StoreResult};
pub use types::{
    ApprovalAction, ApprovalRecord, Channel, Citation, Conversation, ConversationId,
    ConversationStatus, EvalCriterion, EvaluationVerdict, Message, MessageRole, Resolution,
    ResolutionId, RunAttempt, RunId, SourceResult, WorkflowRun, WorkflowTerminal,
};
