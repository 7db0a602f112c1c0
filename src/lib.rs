//! Rep assistance orchestrator
//!
//! A bounded-retry workflow engine for live customer-representative
//! conversations: detects when a representative is asking for help,
//! formulates an optimized search query, fans out to content sources,
//! drafts a cited resolution, and evaluates it against fixed criteria
//! before it is ever shown to the representative.
//!
//! # Pipeline
//!
//! - `trigger` (C1): decides whether the latest rep turn requests assistance.
//! - `query` (C2): turns the transcript (plus prior-attempt feedback) into an
//!   optimized search query.
//! - `source` (C3): the adapter interface and fan-out across registered
//!   content sources.
//! - `resolution` (C4): drafts a cited answer and post-validates citations.
//! - `evaluator` (C5): scores the answer and runs guardrail predicates.
//! - `workflow` (C6): the state machine and retry loop tying C1-C5 together,
//!   with single-flight enforcement, event emission, and persistence.
//!
//! # Ambient stack
//!
//! - `model`: the abstract language-model port C2/C4/C5 depend on.
//! - `events`: bounded per-conversation progress events.
//! - `persistence`: the async seam over the durable state store.
//! - `state`: durable domain types and the RocksDB-backed store.
//! - `config`: `WorkflowConfig`, the engine's tunables.

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod evaluator;
pub mod events;
pub mod fanout;
pub mod model;
pub mod persistence;
pub mod query;
pub mod resolution;
pub mod source;
pub mod state;
pub mod trigger;
pub mod workflow;

pub use config::{StageDeadlines, WorkflowConfig};
pub use evaluator::Evaluator;
pub use events::{EventBus, EventHistory, SharedEventBus, WorkflowEvent, WorkflowEventKind};
pub use fanout::{FanOutResult, SourceFanOut};
pub use model::{LanguageModel, ModelConfig, ModelError};
pub use persistence::{PersistenceError, PersistencePort, RocksPersistence};
pub use query::{FormulatedQuery, PriorAttempt, QueryFormulator};
pub use resolution::{GeneratedResolution, ResolutionError, ResolutionGenerator};
pub use source::{AdapterOutcome, AdapterRegistry, SourceAdapter};
pub use state::{
    ApprovalAction, ApprovalRecord, Channel, Citation, Conversation, ConversationId,
    ConversationStatus, EvalCriterion, EvaluationVerdict, Message, MessageRole, Resolution,
    ResolutionId, RunAttempt, RunId, SharedStateStore, StateStore, SourceResult, WorkflowRun,
    WorkflowTerminal,
};
pub use trigger::{TriggerDetector, TriggerVerdict};
pub use workflow::{CancellationHandle, RunOutcome, WorkflowEngine, WorkflowError};
