//! Runtime configuration for the Workflow Engine and its components
//!
//! A single `WorkflowConfig` covers every recognized option from the
//! external-interfaces contract: retry policy, per-stage and overall
//! deadlines, content bounding, and the trigger phrase list.

use std::time::Duration;

use crate::trigger::default_trigger_phrases;

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Maximum RunAttempts per run.
    pub max_attempts: u32,
    /// Minimum per-criterion evaluator score for a pass.
    pub eval_min_score: u8,
    /// Per-source result cap passed to the fan-out stage.
    pub search_top_k: usize,
    /// Total deadline for the fan-out stage.
    pub search_deadline: Duration,
    /// Per-stage deadlines: query formulation, search, generation, evaluation.
    pub stage_deadlines: StageDeadlines,
    /// Overall wall-clock deadline for a single run.
    pub overall_run_deadline: Duration,
    /// Per-source snippet truncation budget in bytes.
    pub snippet_byte_budget: usize,
    /// Case-insensitive phrases that trigger assistance.
    pub trigger_phrases: Vec<String>,
    /// Logical model tag used for query formulation and generation.
    pub model_tag_generator: String,
    /// Logical model tag used for evaluation, kept independent of the
    /// generator's to reduce correlated bias.
    pub model_tag_evaluator: String,
}

#[derive(Debug, Clone, Copy)]
pub struct StageDeadlines {
    pub query: Duration,
    pub search: Duration,
    pub generate: Duration,
    pub evaluate: Duration,
}

impl Default for StageDeadlines {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(15),
            search: Duration::from_secs(10),
            generate: Duration::from_secs(30),
            evaluate: Duration::from_secs(20),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            eval_min_score: 3,
            search_top_k: 5,
            search_deadline: Duration::from_secs(10),
            stage_deadlines: StageDeadlines::default(),
            overall_run_deadline: Duration::from_secs(90),
            snippet_byte_budget: 2048,
            trigger_phrases: default_trigger_phrases(),
            model_tag_generator: "generator-default".to_string(),
            model_tag_evaluator: "evaluator-default".to_string(),
        }
    }
}
