//! Event types streamed to the representative's UI
//!
//! The Workflow Engine publishes one of these at every state boundary. The
//! canonical order per run is: `workflow_started`, `query_optimized`,
//! `search_complete`, `resolution_generated`, `evaluation_complete` (the
//! latter three repeating once per attempt), then exactly one of
//! `workflow_complete` / `workflow_failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ConversationId, ResolutionId, RunId};

/// Unique identifier for an event, used as its persistence key suffix.
pub type EventId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub conversation_id: ConversationId,
    pub kind: WorkflowEventKind,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(conversation_id: impl Into<String>, kind: WorkflowEventKind) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    pub fn run_id(&self) -> &str {
        self.kind.run_id()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEventKind {
    WorkflowStarted {
        run_id: RunId,
    },
    QueryOptimized {
        run_id: RunId,
        attempt_index: u32,
        optimized_query: String,
    },
    SearchComplete {
        run_id: RunId,
        attempt_index: u32,
        result_count: usize,
        error_count: usize,
    },
    ResolutionGenerated {
        run_id: RunId,
        attempt_index: u32,
        citation_count: usize,
        citation_invalid: bool,
    },
    EvaluationComplete {
        run_id: RunId,
        attempt_index: u32,
        passed: bool,
        feedback: String,
    },
    WorkflowComplete {
        run_id: RunId,
        resolution_id: ResolutionId,
    },
    WorkflowFailed {
        run_id: RunId,
        error_kind: String,
    },
}

impl WorkflowEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::QueryOptimized { .. } => "query_optimized",
            Self::SearchComplete { .. } => "search_complete",
            Self::ResolutionGenerated { .. } => "resolution_generated",
            Self::EvaluationComplete { .. } => "evaluation_complete",
            Self::WorkflowComplete { .. } => "workflow_complete",
            Self::WorkflowFailed { .. } => "workflow_failed",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::WorkflowStarted { run_id }
            | Self::QueryOptimized { run_id, .. }
            | Self::SearchComplete { run_id, .. }
            | Self::ResolutionGenerated { run_id, .. }
            | Self::EvaluationComplete { run_id, .. }
            | Self::WorkflowComplete { run_id, .. }
            | Self::WorkflowFailed { run_id, .. } => run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkflowComplete { .. } | Self::WorkflowFailed { .. })
    }
}
