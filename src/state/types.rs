//! Core domain types for the rep assistance orchestrator
//!
//! These types are stored through the persistence port and represent the
//! durable state of a conversation's assist workflow: the conversation and
//! its messages, the workflow runs executed against it, and the sealed
//! attempts and resolutions each run produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a conversation
pub type ConversationId = String;

/// Unique identifier for a workflow run
pub type RunId = String;

/// Unique identifier for a resolution
pub type ResolutionId = String;

/// Transport channel a conversation is taking place on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Voice,
    Chat,
    Email,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Voice => write!(f, "voice"),
            Channel::Chat => write!(f, "chat"),
            Channel::Email => write!(f, "email"),
        }
    }
}

/// Lifecycle status of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Completed,
    Escalated,
}

/// A live customer<->representative conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub representative_id: String,
    pub customer_id: Option<String>,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, representative_id: impl Into<String>, channel: Channel) -> Self {
        Self {
            id: id.into(),
            representative_id: representative_id.into(),
            customer_id: None,
            channel,
            status: ConversationStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }
}

/// Role of the speaker for a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Customer,
    Representative,
    System,
}

/// An append-only message within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        sequence: u64,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            sequence,
            timestamp: Utc::now(),
        }
    }
}

/// Terminal state a WorkflowRun can settle into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTerminal {
    Succeeded,
    Failed,
    Aborted,
}

impl std::fmt::Display for WorkflowTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowTerminal::Succeeded => write!(f, "succeeded"),
            WorkflowTerminal::Failed => write!(f, "failed"),
            WorkflowTerminal::Aborted => write!(f, "aborted"),
        }
    }
}

/// The per-invocation record of the pipeline for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub conversation_id: ConversationId,
    pub started_at: DateTime<Utc>,
    pub terminal: Option<WorkflowTerminal>,
    pub attempt_count: u32,
    pub final_verdict: Option<EvaluationVerdict>,
    pub error_kind: Option<String>,
}

impl WorkflowRun {
    pub fn new(id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            started_at: Utc::now(),
            terminal: None,
            attempt_count: 0,
            final_verdict: None,
            error_kind: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.terminal.is_none()
    }

    pub fn seal(&mut self, terminal: WorkflowTerminal, error_kind: Option<String>, final_verdict: Option<EvaluationVerdict>) {
        self.terminal = Some(terminal);
        self.error_kind = error_kind;
        self.final_verdict = final_verdict;
    }
}

/// A single content-source hit collected during fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub source_tag: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub relevance: f32,
}

impl SourceResult {
    /// Canonical dedup key: lower-cased URL with any fragment stripped
    pub fn canonical_url(&self) -> String {
        let lower = self.url.to_lowercase();
        match lower.split_once('#') {
            Some((base, _)) => base.to_string(),
            None => lower,
        }
    }
}

/// Fixed evaluation criteria scored on every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvalCriterion {
    Accuracy,
    Relevancy,
    FactualGrounding,
    CitationQuality,
    Clarity,
}

impl EvalCriterion {
    pub fn all() -> &'static [EvalCriterion] {
        &[
            EvalCriterion::Accuracy,
            EvalCriterion::Relevancy,
            EvalCriterion::FactualGrounding,
            EvalCriterion::CitationQuality,
            EvalCriterion::Clarity,
        ]
    }
}

/// Structured verdict produced by the evaluator for one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    pub scores: HashMap<EvalCriterion, u8>,
    pub guardrails_passed: bool,
    pub feedback: String,
    pub passed: bool,
}

impl EvaluationVerdict {
    /// Derive `passed` per contract: guardrails_passed && min(scores) >= threshold
    pub fn derive(scores: HashMap<EvalCriterion, u8>, guardrails_passed: bool, feedback: String, threshold: u8) -> Self {
        let min_score = scores.values().copied().min().unwrap_or(0);
        let passed = guardrails_passed && min_score >= threshold;
        Self {
            scores,
            guardrails_passed,
            feedback,
            passed,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            scores: HashMap::new(),
            guardrails_passed: false,
            feedback: "evaluator_unavailable".to_string(),
            passed: false,
        }
    }
}

/// A `(label, url)` pair referenced inline in a resolution's text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub label: String,
    pub url: String,
}

/// One pass through query-formulation -> search -> generation -> evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAttempt {
    pub run_id: RunId,
    pub attempt_index: u32,
    pub optimized_query: String,
    pub query_metadata: HashMap<String, Vec<String>>,
    pub source_results: Vec<SourceResult>,
    pub source_errors: HashMap<String, String>,
    pub resolution_text: Option<String>,
    pub citations: Vec<Citation>,
    pub verdict: Option<EvaluationVerdict>,
    pub sealed: bool,
}

impl RunAttempt {
    pub fn new(run_id: impl Into<String>, attempt_index: u32) -> Self {
        Self {
            run_id: run_id.into(),
            attempt_index,
            optimized_query: String::new(),
            query_metadata: HashMap::new(),
            source_results: Vec::new(),
            source_errors: HashMap::new(),
            resolution_text: None,
            citations: Vec::new(),
            verdict: None,
            sealed: false,
        }
    }

    /// Seal the attempt, fixing its verdict; once sealed it is immutable.
    pub fn seal(&mut self, verdict: EvaluationVerdict) {
        self.verdict = Some(verdict);
        self.sealed = true;
    }
}

/// The sealed output of a successful RunAttempt, pending rep review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub id: ResolutionId,
    pub run_id: RunId,
    pub attempt_index: u32,
    pub resolution_text: String,
    pub citations: Vec<Citation>,
    pub scores: HashMap<EvalCriterion, u8>,
    pub pending_review: bool,
    pub approval: Option<ApprovalRecord>,
    pub created_at: DateTime<Utc>,
}

impl Resolution {
    pub fn new(
        id: impl Into<String>,
        run_id: impl Into<String>,
        attempt_index: u32,
        resolution_text: impl Into<String>,
        citations: Vec<Citation>,
        scores: HashMap<EvalCriterion, u8>,
    ) -> Self {
        Self {
            id: id.into(),
            run_id: run_id.into(),
            attempt_index,
            resolution_text: resolution_text.into(),
            citations,
            scores,
            pending_review: true,
            approval: None,
            created_at: Utc::now(),
        }
    }
}

/// Representative action taken on a pending Resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Edit,
}

/// Terminal, non-editable record of a representative's decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub action: ApprovalAction,
    pub feedback: Option<String>,
    pub representative_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn new(action: ApprovalAction, representative_id: impl Into<String>) -> Self {
        Self {
            action,
            feedback: None,
            representative_id: representative_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_defaults_active() {
        let conv = Conversation::new("c1", "rep-1", Channel::Chat);
        assert!(conv.is_active());
        assert!(conv.customer_id.is_none());
    }

    #[test]
    fn run_starts_in_flight() {
        let run = WorkflowRun::new("r1", "c1");
        assert!(run.is_in_flight());
        run.clone().seal(WorkflowTerminal::Succeeded, None, None);
    }

    #[test]
    fn seal_marks_terminal() {
        let mut run = WorkflowRun::new("r1", "c1");
        run.seal(WorkflowTerminal::Failed, Some("no_sources".to_string()), None);
        assert!(!run.is_in_flight());
        assert_eq!(run.terminal, Some(WorkflowTerminal::Failed));
        assert!(run.final_verdict.is_none());
    }

    #[test]
    fn source_result_canonical_url_strips_fragment_and_case() {
        let r = SourceResult {
            source_tag: "fidelity".to_string(),
            title: "t".to_string(),
            url: "HTTPS://Example.com/Page#section".to_string(),
            snippet: "s".to_string(),
            relevance: 0.5,
        };
        assert_eq!(r.canonical_url(), "https://example.com/page");
    }

    #[test]
    fn verdict_derive_requires_guardrails_and_min_score() {
        let mut scores = HashMap::new();
        scores.insert(EvalCriterion::Accuracy, 5);
        scores.insert(EvalCriterion::Relevancy, 2);
        let v = EvaluationVerdict::derive(scores.clone(), true, String::new(), 3);
        assert!(!v.passed);

        let v2 = EvaluationVerdict::derive(scores, false, String::new(), 1);
        assert!(!v2.passed);
    }

    #[test]
    fn attempt_seal_locks_verdict() {
        let mut attempt = RunAttempt::new("r1", 1);
        assert!(!attempt.sealed);
        attempt.seal(EvaluationVerdict::unavailable());
        assert!(attempt.sealed);
        assert!(attempt.verdict.is_some());
    }
}
