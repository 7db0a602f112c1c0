//! Evaluator (C5)
//!
//! Scores the answer on fixed criteria and runs guardrail predicates. Must
//! be configured independently of the generator (a distinct model/config)
//! to reduce correlated bias, and must never rewrite the resolution.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::model::{LanguageModel, ModelConfig};
use crate::state::{EvalCriterion, EvaluationVerdict};

const DEFAULT_MIN_SCORE: u8 = 3;
const MIN_CITATIONS_FOR_GUARDRAIL: usize = 1;
const MIN_LENGTH_CHARS: usize = 40;

#[derive(Debug, Deserialize, Default)]
struct ModelScoreReply {
    #[serde(default)]
    accuracy: u8,
    #[serde(default)]
    relevancy: u8,
    #[serde(default)]
    factual_grounding: u8,
    #[serde(default)]
    citation_quality: u8,
    #[serde(default)]
    clarity: u8,
    #[serde(default)]
    feedback: String,
}

pub struct Evaluator {
    model: Arc<dyn LanguageModel>,
    config: ModelConfig,
    min_score: u8,
}

impl Evaluator {
    pub fn new(model: Arc<dyn LanguageModel>, model_tag: impl Into<String>) -> Self {
        Self {
            model,
            config: ModelConfig::new(model_tag).with_temperature(0.0),
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = min_score;
        self
    }

    pub async fn evaluate(
        &self,
        query: &str,
        resolution_text: &str,
        citation_count: usize,
    ) -> EvaluationVerdict {
        let guardrails_passed = self.guardrails(resolution_text, citation_count);

        let prompt = build_prompt(query, resolution_text);
        let raw = match self.model.complete(&prompt, &self.config).await {
            Ok(raw) => raw,
            Err(_) => return EvaluationVerdict::unavailable(),
        };

        let parsed: ModelScoreReply = serde_json::from_str(&raw).unwrap_or_default();
        let scores = scores_from_reply(&parsed);

        EvaluationVerdict::derive(scores, guardrails_passed, parsed.feedback, self.min_score)
    }

    fn guardrails(&self, resolution_text: &str, citation_count: usize) -> bool {
        let min_length_ok = resolution_text.chars().count() >= MIN_LENGTH_CHARS;
        let has_citation = citation_count >= MIN_CITATIONS_FOR_GUARDRAIL;
        let safety_ok = !contains_policy_violation(resolution_text);
        min_length_ok && has_citation && safety_ok
    }
}

fn scores_from_reply(reply: &ModelScoreReply) -> HashMap<EvalCriterion, u8> {
    let mut scores = HashMap::new();
    scores.insert(EvalCriterion::Accuracy, reply.accuracy.clamp(1, 5));
    scores.insert(EvalCriterion::Relevancy, reply.relevancy.clamp(1, 5));
    scores.insert(EvalCriterion::FactualGrounding, reply.factual_grounding.clamp(1, 5));
    scores.insert(EvalCriterion::CitationQuality, reply.citation_quality.clamp(1, 5));
    scores.insert(EvalCriterion::Clarity, reply.clarity.clamp(1, 5));
    scores
}

fn contains_policy_violation(text: &str) -> bool {
    const BANNED: &[&str] = &["guaranteed returns", "ignore compliance"];
    let lowered = text.to_lowercase();
    BANNED.iter().any(|b| lowered.contains(b))
}

fn build_prompt(query: &str, resolution_text: &str) -> String {
    format!(
        "Score this answer to \"{}\" on accuracy, relevancy, factual_grounding, \
         citation_quality, clarity (each 1-5 integer), and give a short feedback string. \
         Reply as JSON. Do not rewrite the answer:\n{}",
        query, resolution_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::ScriptedModel;
    use crate::model::ModelError;

    #[tokio::test]
    async fn all_high_scores_pass() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"accuracy":5,"relevancy":5,"factual_grounding":5,"citation_quality":5,"clarity":5,"feedback":""}"#
                .to_string(),
        )]);
        let evaluator = Evaluator::new(Arc::new(model), "eval-model");
        let verdict = evaluator
            .evaluate("q", "A reasonably long resolution text about something useful.", 1)
            .await;
        assert!(verdict.passed);
        assert!(verdict.guardrails_passed);
    }

    #[tokio::test]
    async fn low_score_fails_even_with_guardrails_passed() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"accuracy":2,"relevancy":5,"factual_grounding":5,"citation_quality":5,"clarity":5,"feedback":"low accuracy"}"#
                .to_string(),
        )]);
        let evaluator = Evaluator::new(Arc::new(model), "eval-model");
        let verdict = evaluator
            .evaluate("q", "A reasonably long resolution text about something useful.", 1)
            .await;
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn no_citations_fails_guardrails() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"accuracy":5,"relevancy":5,"factual_grounding":5,"citation_quality":5,"clarity":5,"feedback":""}"#
                .to_string(),
        )]);
        let evaluator = Evaluator::new(Arc::new(model), "eval-model");
        let verdict = evaluator
            .evaluate("q", "A reasonably long resolution text about something useful.", 0)
            .await;
        assert!(!verdict.guardrails_passed);
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn short_text_fails_guardrails() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"accuracy":5,"relevancy":5,"factual_grounding":5,"citation_quality":5,"clarity":5,"feedback":""}"#
                .to_string(),
        )]);
        let evaluator = Evaluator::new(Arc::new(model), "eval-model");
        let verdict = evaluator.evaluate("q", "too short", 1).await;
        assert!(!verdict.guardrails_passed);
    }

    #[tokio::test]
    async fn model_error_yields_evaluator_unavailable_feedback() {
        let model = ScriptedModel::new(vec![Err(ModelError::Timeout)]);
        let evaluator = Evaluator::new(Arc::new(model), "eval-model");
        let verdict = evaluator
            .evaluate("q", "A reasonably long resolution text about something useful.", 1)
            .await;
        assert!(!verdict.passed);
        assert_eq!(verdict.feedback, "evaluator_unavailable");
    }
}
