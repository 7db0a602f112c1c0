//! Workflow Engine (C6) — orchestrates C1-C5 through the state machine
//!
//! Runs trigger detection, query formulation, source fan-out, resolution
//! generation, and evaluation in a bounded retry loop, emitting a typed
//! event at every boundary and writing through to persistence after every
//! sealed attempt. At most one run is ever in flight per conversation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::evaluator::Evaluator;
use crate::events::{SharedEventBus, WorkflowEvent, WorkflowEventKind};
use crate::fanout::SourceFanOut;
use crate::persistence::{PersistenceError, PersistencePort};
use crate::query::{PriorAttempt, QueryFormulator};
use crate::resolution::{ResolutionError, ResolutionGenerator};
use crate::source::AdapterRegistry;
use crate::state::{EvaluationVerdict, Message, Resolution, RunAttempt, WorkflowRun, WorkflowTerminal};
use crate::trigger::TriggerDetector;

use super::singleflight::{SingleFlightError, SingleFlightRegistry};
use super::state::{WorkflowPhase, WorkflowState};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("run_in_progress")]
    RunInProgress,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<SingleFlightError> for WorkflowError {
    fn from(_: SingleFlightError) -> Self {
        WorkflowError::RunInProgress
    }
}

/// Shared cancellation flag for one run. Checked only at state boundaries,
/// never mid-call: a stage already in flight always completes or times out
/// on its own before the engine notices cancellation.
#[derive(Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final shape of a run, returned once it reaches a terminal phase.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub terminal: WorkflowTerminal,
    pub resolution: Option<Resolution>,
    pub error_kind: Option<String>,
}

/// What to do after an attempt ends without a passing verdict.
enum NextStep {
    Retry,
    Fail(String),
}

pub struct WorkflowEngine {
    trigger: TriggerDetector,
    query_formulator: QueryFormulator,
    registry: AdapterRegistry,
    resolution_generator: ResolutionGenerator,
    evaluator: Evaluator,
    persistence: Arc<dyn PersistencePort>,
    events: SharedEventBus,
    single_flight: SingleFlightRegistry,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trigger: TriggerDetector,
        query_formulator: QueryFormulator,
        registry: AdapterRegistry,
        resolution_generator: ResolutionGenerator,
        evaluator: Evaluator,
        persistence: Arc<dyn PersistencePort>,
        events: SharedEventBus,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            trigger,
            query_formulator,
            registry,
            resolution_generator,
            evaluator,
            persistence,
            events,
            single_flight: SingleFlightRegistry::new(),
            config,
        }
    }

    /// Run the assistance workflow for a conversation. `force_trigger`
    /// bypasses phrase matching (an explicit rep-initiated request).
    pub async fn run(&self, conversation_id: &str, force_trigger: bool) -> Result<RunOutcome, WorkflowError> {
        self.run_with_cancellation(conversation_id, force_trigger, CancellationHandle::new())
            .await
    }

    pub async fn run_with_cancellation(
        &self,
        conversation_id: &str,
        force_trigger: bool,
        cancellation: CancellationHandle,
    ) -> Result<RunOutcome, WorkflowError> {
        let run_id = Uuid::new_v4().to_string();
        let _guard = self.single_flight.try_acquire(conversation_id, run_id.clone())?;

        let history = self.persistence.load_messages(conversation_id).await?;

        let mut run = WorkflowRun::new(run_id.clone(), conversation_id);
        self.persistence.save_run(&run).await?;
        self.emit(conversation_id, WorkflowEventKind::WorkflowStarted { run_id: run_id.clone() });

        let mut state = WorkflowState::new(run_id.clone());
        let deadline_at = Instant::now() + self.config.overall_run_deadline;

        state
            .transition(WorkflowPhase::Detecting, "run requested")
            .expect("idle -> detecting is always valid");

        let verdict = self.trigger.detect(&history, force_trigger);
        if !verdict.triggered {
            return self.abort(&mut state, &mut run, "no_trigger").await;
        }

        state
            .transition(WorkflowPhase::Formulating, "trigger matched")
            .expect("detecting -> formulating is always valid");

        let mut prior_attempts: Vec<PriorAttempt> = Vec::new();
        let mut attempt_index: u32 = 1;

        loop {
            if cancellation.is_cancelled() {
                return self.abort(&mut state, &mut run, "cancelled").await;
            }
            if Instant::now() >= deadline_at {
                return self.abort(&mut state, &mut run, "run_deadline_exceeded").await;
            }

            run.attempt_count = attempt_index;
            let mut attempt = RunAttempt::new(run_id.clone(), attempt_index);

            let formulated = match self.formulate(&history, &prior_attempts).await {
                Ok(f) => f,
                Err(error_kind) => return self.fail(&mut state, &mut run, &error_kind, None).await,
            };
            attempt.optimized_query = formulated.optimized_query.clone();
            attempt.query_metadata = formulated.metadata.clone();
            self.emit(
                conversation_id,
                WorkflowEventKind::QueryOptimized {
                    run_id: run_id.clone(),
                    attempt_index,
                    optimized_query: formulated.optimized_query.clone(),
                },
            );

            state
                .transition(WorkflowPhase::Searching, "query produced")
                .expect("formulating -> searching is always valid");

            let fanout = SourceFanOut::new(&self.registry).with_snippet_byte_budget(self.config.snippet_byte_budget);
            let search_result = fanout
                .search(&formulated.optimized_query, self.config.search_top_k, self.config.search_deadline)
                .await;

            attempt.source_results = search_result.results.clone();
            attempt.source_errors = search_result.errors.clone();
            self.emit(
                conversation_id,
                WorkflowEventKind::SearchComplete {
                    run_id: run_id.clone(),
                    attempt_index,
                    result_count: search_result.results.len(),
                    error_count: search_result.errors.len(),
                },
            );

            state
                .transition(WorkflowPhase::Generating, "results returned")
                .expect("searching -> generating is always valid");

            let generated = match tokio::time::timeout(
                self.config.stage_deadlines.generate,
                self.resolution_generator
                    .generate(&formulated.optimized_query, &search_result.results, &prior_attempts),
            )
            .await
            {
                Ok(Ok(g)) => g,
                Ok(Err(ResolutionError::NoSources)) => {
                    attempt.seal(failed_stage_verdict("no_sources"));
                    self.persistence.save_attempt(&attempt).await?;
                    match self.decide_next(attempt_index) {
                        NextStep::Retry => {
                            self.carry_forward(&mut state, &mut prior_attempts, &mut attempt_index, &attempt, "no_sources");
                            continue;
                        }
                        NextStep::Fail(reason) => return self.fail(&mut state, &mut run, &reason, None).await,
                    }
                }
                Ok(Err(ResolutionError::ModelUnavailable)) => {
                    return self.fail(&mut state, &mut run, "model_unavailable", None).await;
                }
                Err(_) => {
                    attempt.seal(failed_stage_verdict("stage_timeout"));
                    self.persistence.save_attempt(&attempt).await?;
                    match self.decide_next(attempt_index) {
                        NextStep::Retry => {
                            self.carry_forward(&mut state, &mut prior_attempts, &mut attempt_index, &attempt, "stage_timeout");
                            continue;
                        }
                        NextStep::Fail(reason) => return self.fail(&mut state, &mut run, &reason, None).await,
                    }
                }
            };

            if generated.citation_invalid {
                attempt.resolution_text = Some(generated.resolution_text.clone());
                attempt.citations = generated.citations.clone();
                attempt.seal(failed_stage_verdict("citation_invalid"));
                self.persistence.save_attempt(&attempt).await?;
                self.emit(
                    conversation_id,
                    WorkflowEventKind::ResolutionGenerated {
                        run_id: run_id.clone(),
                        attempt_index,
                        citation_count: generated.citations.len(),
                        citation_invalid: true,
                    },
                );
                match self.decide_next(attempt_index) {
                    NextStep::Retry => {
                        self.carry_forward(&mut state, &mut prior_attempts, &mut attempt_index, &attempt, "citation_invalid");
                        continue;
                    }
                    NextStep::Fail(reason) => return self.fail(&mut state, &mut run, &reason, None).await,
                }
            }

            attempt.resolution_text = Some(generated.resolution_text.clone());
            attempt.citations = generated.citations.clone();
            self.emit(
                conversation_id,
                WorkflowEventKind::ResolutionGenerated {
                    run_id: run_id.clone(),
                    attempt_index,
                    citation_count: generated.citations.len(),
                    citation_invalid: false,
                },
            );

            state
                .transition(WorkflowPhase::Evaluating, "resolution produced")
                .expect("generating -> evaluating is always valid");

            let verdict = tokio::time::timeout(
                self.config.stage_deadlines.evaluate,
                self.evaluator
                    .evaluate(&formulated.optimized_query, &generated.resolution_text, generated.citations.len()),
            )
            .await
            .unwrap_or_else(|_| EvaluationVerdict::unavailable());

            attempt.seal(verdict.clone());
            self.persistence.save_attempt(&attempt).await?;
            self.emit(
                conversation_id,
                WorkflowEventKind::EvaluationComplete {
                    run_id: run_id.clone(),
                    attempt_index,
                    passed: verdict.passed,
                    feedback: verdict.feedback.clone(),
                },
            );

            if verdict.passed {
                state
                    .transition(WorkflowPhase::Succeeded, "verdict passed")
                    .expect("evaluating -> succeeded is always valid");

                let resolution = Resolution::new(
                    Uuid::new_v4().to_string(),
                    run_id.clone(),
                    attempt_index,
                    generated.resolution_text,
                    generated.citations,
                    verdict.scores.clone(),
                );
                self.persistence.save_resolution(&resolution).await?;
                run.seal(WorkflowTerminal::Succeeded, None, Some(verdict));
                self.persistence.save_run(&run).await?;
                self.emit(
                    conversation_id,
                    WorkflowEventKind::WorkflowComplete {
                        run_id: run_id.clone(),
                        resolution_id: resolution.id.clone(),
                    },
                );
                info!(run_id = %run_id, attempt_index, "workflow succeeded");
                return Ok(RunOutcome {
                    run_id,
                    terminal: WorkflowTerminal::Succeeded,
                    resolution: Some(resolution),
                    error_kind: None,
                });
            }

            match self.decide_next(attempt_index) {
                NextStep::Retry => {
                    let feedback = verdict.feedback.clone();
                    self.carry_forward(&mut state, &mut prior_attempts, &mut attempt_index, &attempt, &feedback);
                    continue;
                }
                NextStep::Fail(reason) => return self.fail(&mut state, &mut run, &reason, Some(verdict)).await,
            }
        }
    }

    async fn formulate(
        &self,
        history: &[Message],
        prior_attempts: &[PriorAttempt],
    ) -> Result<crate::query::FormulatedQuery, String> {
        match tokio::time::timeout(self.config.stage_deadlines.query, self.query_formulator.formulate(history, prior_attempts)).await {
            Ok(Ok(formulated)) => Ok(formulated),
            Ok(Err(_)) | Err(_) => Err("model_unavailable".to_string()),
        }
    }

    /// Whether another attempt is available under the retry budget.
    fn decide_next(&self, attempt_index: u32) -> NextStep {
        if attempt_index < self.config.max_attempts {
            NextStep::Retry
        } else {
            NextStep::Fail("retries_exhausted".to_string())
        }
    }

    /// Record feedback from the just-sealed attempt and move the state
    /// machine back to Formulating for the next one.
    fn carry_forward(
        &self,
        state: &mut WorkflowState,
        prior_attempts: &mut Vec<PriorAttempt>,
        attempt_index: &mut u32,
        sealed_attempt: &RunAttempt,
        feedback: &str,
    ) {
        prior_attempts.push(PriorAttempt {
            attempt_index: *attempt_index,
            query: sealed_attempt.optimized_query.clone(),
            feedback: feedback.to_string(),
        });

        state
            .transition(WorkflowPhase::Retry, feedback)
            .expect("generating/evaluating -> retry is always valid");
        state
            .transition(WorkflowPhase::Formulating, "retrying")
            .expect("retry -> formulating is always valid");
        *attempt_index += 1;
        warn!(run_id = %state.run_id, attempt = *attempt_index, reason = feedback, "retrying attempt");
    }

    async fn fail(
        &self,
        state: &mut WorkflowState,
        run: &mut WorkflowRun,
        error_kind: &str,
        final_verdict: Option<EvaluationVerdict>,
    ) -> Result<RunOutcome, WorkflowError> {
        let _ = state.transition(WorkflowPhase::Failed, error_kind);
        run.seal(WorkflowTerminal::Failed, Some(error_kind.to_string()), final_verdict);
        self.persistence.save_run(run).await?;
        self.emit(
            &run.conversation_id,
            WorkflowEventKind::WorkflowFailed {
                run_id: run.id.clone(),
                error_kind: error_kind.to_string(),
            },
        );
        Ok(RunOutcome {
            run_id: run.id.clone(),
            terminal: WorkflowTerminal::Failed,
            resolution: None,
            error_kind: Some(error_kind.to_string()),
        })
    }

    async fn abort(&self, state: &mut WorkflowState, run: &mut WorkflowRun, reason: &str) -> Result<RunOutcome, WorkflowError> {
        let _ = state.transition(WorkflowPhase::Aborted, reason);
        run.seal(WorkflowTerminal::Aborted, Some(reason.to_string()), None);
        self.persistence.save_run(run).await?;
        self.emit(
            &run.conversation_id,
            WorkflowEventKind::WorkflowFailed {
                run_id: run.id.clone(),
                error_kind: reason.to_string(),
            },
        );
        Ok(RunOutcome {
            run_id: run.id.clone(),
            terminal: WorkflowTerminal::Aborted,
            resolution: None,
            error_kind: Some(reason.to_string()),
        })
    }

    fn emit(&self, conversation_id: &str, kind: WorkflowEventKind) {
        if let Err(e) = self.events.publish(WorkflowEvent::new(conversation_id, kind)) {
            warn!(%conversation_id, "failed to publish workflow event: {}", e);
        }
    }
}

fn failed_stage_verdict(feedback: &str) -> EvaluationVerdict {
    EvaluationVerdict {
        scores: Default::default(),
        guardrails_passed: false,
        feedback: feedback.to_string(),
        passed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::model::test_support::ScriptedModel;
    use crate::model::ModelError;
    use crate::persistence::RocksPersistence;
    use crate::state::{Channel, Conversation, MessageRole, StateStore};
    use tempfile::tempdir;

    struct Fixture {
        engine: WorkflowEngine,
        events: SharedEventBus,
        _dir: tempfile::TempDir,
    }

    fn build(
        query_replies: Vec<Result<String, ModelError>>,
        gen_replies: Vec<Result<String, ModelError>>,
        eval_replies: Vec<Result<String, ModelError>>,
        config: WorkflowConfig,
    ) -> Fixture {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("test.db")).unwrap().shared();
        store
            .put_conversation(&Conversation::new("c1", "rep-1", Channel::Chat))
            .unwrap();
        store
            .put_message(&crate::state::Message::new(
                "c1",
                MessageRole::Representative,
                "let me check that for you",
                0,
            ))
            .unwrap();

        let persistence: Arc<dyn PersistencePort> = Arc::new(RocksPersistence::new(store));
        let events = EventBus::new().shared();

        let query_model = Arc::new(ScriptedModel::new(query_replies));
        let gen_model = Arc::new(ScriptedModel::new(gen_replies));
        let eval_model = Arc::new(ScriptedModel::new(eval_replies));

        let registry = AdapterRegistry::new();
        registry.register(Arc::new(
            crate::source::InternalKnowledgeAdapter::new("mygps", Some("token".to_string())).with_lookup(Box::new(
                crate::source::internal::StaticLookup(vec![crate::state::SourceResult {
                    source_tag: "mygps".to_string(),
                    title: "Password Reset".to_string(),
                    url: "https://internal.example/password".to_string(),
                    snippet: "Reset your password from account settings.".to_string(),
                    relevance: 0.9,
                }]),
            )),
        ));

        let engine = WorkflowEngine::new(
            TriggerDetector::default(),
            QueryFormulator::new(query_model, "gen-model"),
            registry,
            ResolutionGenerator::new(gen_model, "gen-model"),
            Evaluator::new(eval_model, "eval-model"),
            persistence,
            events.clone(),
            config,
        );

        Fixture {
            engine,
            events,
            _dir: dir,
        }
    }

    fn query_reply() -> Result<String, ModelError> {
        Ok(r#"{"query":"password reset","keywords":["password"],"entities":[],"intent":"account_access"}"#.to_string())
    }

    fn gen_reply_valid() -> Result<String, ModelError> {
        Ok("Reset from account settings [Source: https://internal.example/password].".to_string())
    }

    fn eval_reply_pass() -> Result<String, ModelError> {
        Ok(r#"{"accuracy":5,"relevancy":5,"factual_grounding":5,"citation_quality":5,"clarity":5,"feedback":""}"#.to_string())
    }

    fn eval_reply_fail() -> Result<String, ModelError> {
        Ok(r#"{"accuracy":1,"relevancy":1,"factual_grounding":1,"citation_quality":1,"clarity":1,"feedback":"too vague"}"#
            .to_string())
    }

    #[tokio::test]
    async fn happy_path_succeeds_on_first_attempt() {
        let fixture = build(vec![query_reply()], vec![gen_reply_valid()], vec![eval_reply_pass()], WorkflowConfig::default());
        let outcome = fixture.engine.run("c1", false).await.unwrap();
        assert_eq!(outcome.terminal, WorkflowTerminal::Succeeded);
        assert!(outcome.resolution.is_some());
    }

    #[tokio::test]
    async fn no_trigger_aborts_without_calling_any_model() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("test.db")).unwrap().shared();
        store.put_conversation(&Conversation::new("c1", "rep-1", Channel::Chat)).unwrap();
        store
            .put_message(&crate::state::Message::new("c1", MessageRole::Customer, "hello", 0))
            .unwrap();
        let persistence: Arc<dyn PersistencePort> = Arc::new(RocksPersistence::new(store));
        let events = EventBus::new().shared();
        let engine = WorkflowEngine::new(
            TriggerDetector::default(),
            QueryFormulator::new(Arc::new(ScriptedModel::new(vec![])), "m"),
            AdapterRegistry::new(),
            ResolutionGenerator::new(Arc::new(ScriptedModel::new(vec![])), "m"),
            Evaluator::new(Arc::new(ScriptedModel::new(vec![])), "m"),
            persistence,
            events,
            WorkflowConfig::default(),
        );
        let outcome = engine.run("c1", false).await.unwrap();
        assert_eq!(outcome.terminal, WorkflowTerminal::Aborted);
        assert_eq!(outcome.error_kind.as_deref(), Some("no_trigger"));
    }

    #[tokio::test]
    async fn retries_then_succeeds_after_feedback() {
        let fixture = build(
            vec![query_reply(), query_reply()],
            vec![gen_reply_valid(), gen_reply_valid()],
            vec![eval_reply_fail(), eval_reply_pass()],
            WorkflowConfig::default(),
        );
        let outcome = fixture.engine.run("c1", false).await.unwrap();
        assert_eq!(outcome.terminal, WorkflowTerminal::Succeeded);
    }

    #[tokio::test]
    async fn exhausts_retries_and_fails() {
        let mut config = WorkflowConfig::default();
        config.max_attempts = 2;
        let fixture = build(
            vec![query_reply(), query_reply()],
            vec![gen_reply_valid(), gen_reply_valid()],
            vec![eval_reply_fail(), eval_reply_fail()],
            config,
        );
        let outcome = fixture.engine.run("c1", false).await.unwrap();
        assert_eq!(outcome.terminal, WorkflowTerminal::Failed);
        assert_eq!(outcome.error_kind.as_deref(), Some("retries_exhausted"));
    }

    #[tokio::test]
    async fn duplicate_trigger_is_rejected_while_in_flight() {
        let fixture = build(vec![query_reply()], vec![gen_reply_valid()], vec![eval_reply_pass()], WorkflowConfig::default());
        let guard = fixture.engine.single_flight.try_acquire("c1", "other-run").unwrap();
        let err = fixture.engine.run("c1", false).await.unwrap_err();
        assert!(matches!(err, WorkflowError::RunInProgress));
        drop(guard);
    }

    #[tokio::test]
    async fn events_are_observable_on_the_conversation_subscription() {
        let fixture = build(vec![query_reply()], vec![gen_reply_valid()], vec![eval_reply_pass()], WorkflowConfig::default());
        let mut sub = fixture.events.subscribe("c1");
        fixture.engine.run("c1", false).await.unwrap();
        let drained = sub.drain();
        let types: Vec<&str> = drained.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "workflow_started",
                "query_optimized",
                "search_complete",
                "resolution_generated",
                "evaluation_complete",
                "workflow_complete"
            ]
        );
    }
}
