//! Workflow state machine — phases, transitions, and run tracking.

use chrono::{DateTime, Utc};

/// Phase of a single workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowPhase {
    /// Run created but not started.
    Idle,
    /// Checking whether the latest rep turn requests assistance.
    Detecting,
    /// Formulating an optimized search query.
    Formulating,
    /// Fanning out to content sources.
    Searching,
    /// Generating a cited resolution.
    Generating,
    /// Scoring the resolution against fixed criteria.
    Evaluating,
    /// Verdict passed — run is done.
    Succeeded,
    /// Verdict failed (or generation needs grounding) and another attempt
    /// remains; immediately re-enters `Formulating`.
    Retry,
    /// Retries exhausted without a passing verdict.
    Failed,
    /// Cancelled, or no trigger was detected.
    Aborted,
}

impl WorkflowPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }

    pub fn valid_transitions(self) -> &'static [WorkflowPhase] {
        match self {
            Self::Idle => &[Self::Detecting, Self::Aborted],
            Self::Detecting => &[Self::Formulating, Self::Aborted],
            Self::Formulating => &[Self::Searching, Self::Failed, Self::Aborted],
            Self::Searching => &[Self::Generating, Self::Aborted],
            Self::Generating => &[Self::Evaluating, Self::Retry, Self::Failed, Self::Aborted],
            Self::Evaluating => &[Self::Succeeded, Self::Retry, Self::Failed, Self::Aborted],
            Self::Retry => &[Self::Formulating, Self::Aborted],
            Self::Succeeded | Self::Failed | Self::Aborted => &[],
        }
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Detecting => write!(f, "detecting"),
            Self::Formulating => write!(f, "formulating"),
            Self::Searching => write!(f, "searching"),
            Self::Generating => write!(f, "generating"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Retry => write!(f, "retry"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone)]
pub struct WorkflowTransition {
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transition {} -> {}: {}", self.from, self.to, self.reason)
    }
}

impl std::error::Error for TransitionError {}

/// A single run's state machine, with full transition history for
/// persistence and debugging.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub run_id: String,
    pub phase: WorkflowPhase,
    pub attempt_index: u32,
    pub transitions: Vec<WorkflowTransition>,
}

impl WorkflowState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            phase: WorkflowPhase::Idle,
            attempt_index: 0,
            transitions: Vec::new(),
        }
    }

    pub fn transition(&mut self, to: WorkflowPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!("not a valid transition (allowed: {:?})", self.phase.valid_transitions()),
            });
        }

        self.transitions.push(WorkflowTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_idle() {
        let state = WorkflowState::new("r1");
        assert_eq!(state.phase, WorkflowPhase::Idle);
        assert!(!state.is_complete());
    }

    #[test]
    fn happy_path_walks_every_phase() {
        let mut state = WorkflowState::new("r1");
        state.transition(WorkflowPhase::Detecting, "run requested").unwrap();
        state.transition(WorkflowPhase::Formulating, "trigger matched").unwrap();
        state.transition(WorkflowPhase::Searching, "query produced").unwrap();
        state.transition(WorkflowPhase::Generating, "results returned").unwrap();
        state.transition(WorkflowPhase::Evaluating, "resolution produced").unwrap();
        state.transition(WorkflowPhase::Succeeded, "verdict passed").unwrap();
        assert!(state.is_complete());
        assert_eq!(state.transitions.len(), 6);
    }

    #[test]
    fn no_trigger_aborts_from_detecting() {
        let mut state = WorkflowState::new("r1");
        state.transition(WorkflowPhase::Detecting, "run requested").unwrap();
        state.transition(WorkflowPhase::Aborted, "no trigger").unwrap();
        assert!(state.is_complete());
    }

    #[test]
    fn retry_loops_back_to_formulating() {
        let mut state = WorkflowState::new("r1");
        state.transition(WorkflowPhase::Detecting, "run requested").unwrap();
        state.transition(WorkflowPhase::Formulating, "trigger matched").unwrap();
        state.transition(WorkflowPhase::Searching, "query produced").unwrap();
        state.transition(WorkflowPhase::Generating, "results returned").unwrap();
        state.transition(WorkflowPhase::Evaluating, "resolution produced").unwrap();
        state.transition(WorkflowPhase::Retry, "verdict failed, attempts remain").unwrap();
        state.transition(WorkflowPhase::Formulating, "retrying").unwrap();
        assert_eq!(state.phase, WorkflowPhase::Formulating);
        assert!(!state.is_complete());
    }

    #[test]
    fn generating_can_retry_on_no_sources() {
        let mut state = WorkflowState::new("r1");
        state.transition(WorkflowPhase::Detecting, "run requested").unwrap();
        state.transition(WorkflowPhase::Formulating, "trigger matched").unwrap();
        state.transition(WorkflowPhase::Searching, "query produced").unwrap();
        state.transition(WorkflowPhase::Generating, "results returned").unwrap();
        state.transition(WorkflowPhase::Retry, "no_sources").unwrap();
        assert_eq!(state.phase, WorkflowPhase::Retry);
    }

    #[test]
    fn exhausted_retries_reach_failed() {
        let mut state = WorkflowState::new("r1");
        state.transition(WorkflowPhase::Detecting, "run requested").unwrap();
        state.transition(WorkflowPhase::Formulating, "trigger matched").unwrap();
        state.transition(WorkflowPhase::Searching, "query produced").unwrap();
        state.transition(WorkflowPhase::Generating, "results returned").unwrap();
        state.transition(WorkflowPhase::Evaluating, "resolution produced").unwrap();
        state.transition(WorkflowPhase::Failed, "verdict failed, attempts exhausted").unwrap();
        assert!(state.is_complete());
    }

    #[test]
    fn terminal_phases_reject_further_transitions() {
        let mut state = WorkflowState::new("r1");
        state.transition(WorkflowPhase::Detecting, "run requested").unwrap();
        state.transition(WorkflowPhase::Aborted, "no trigger").unwrap();
        let err = state.transition(WorkflowPhase::Formulating, "restart").unwrap_err();
        assert_eq!(err.from, WorkflowPhase::Aborted);
    }

    #[test]
    fn cancellation_aborts_from_any_non_terminal_phase() {
        for phase in [
            WorkflowPhase::Detecting,
            WorkflowPhase::Formulating,
            WorkflowPhase::Searching,
            WorkflowPhase::Generating,
            WorkflowPhase::Evaluating,
            WorkflowPhase::Retry,
        ] {
            assert!(phase.valid_transitions().contains(&WorkflowPhase::Aborted));
        }
    }

    #[test]
    fn phase_display_matches_canonical_tags() {
        assert_eq!(WorkflowPhase::Idle.to_string(), "idle");
        assert_eq!(WorkflowPhase::Succeeded.to_string(), "succeeded");
        assert_eq!(WorkflowPhase::Failed.to_string(), "failed");
        assert_eq!(WorkflowPhase::Aborted.to_string(), "aborted");
    }
}
