//! Query Formulator (C2)
//!
//! Produces an optimized search query plus structured metadata from the
//! transcript and prior feedback accumulated in the current run.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::model::{LanguageModel, ModelConfig};
use crate::state::{Message, MessageRole};

const MAX_QUERY_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("model_unavailable")]
    ModelUnavailable,
}

/// One prior attempt's query paired with the evaluator's feedback on it.
#[derive(Debug, Clone)]
pub struct PriorAttempt {
    pub attempt_index: u32,
    pub query: String,
    pub feedback: String,
}

/// Output of query formulation
#[derive(Debug, Clone, Default)]
pub struct FormulatedQuery {
    pub optimized_query: String,
    pub metadata: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelQueryReply {
    #[serde(default)]
    query: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    intent: Option<String>,
}

pub struct QueryFormulator {
    model: Arc<dyn LanguageModel>,
    config: ModelConfig,
}

impl QueryFormulator {
    pub fn new(model: Arc<dyn LanguageModel>, model_tag: impl Into<String>) -> Self {
        Self {
            model,
            config: ModelConfig::new(model_tag).with_temperature(0.1),
        }
    }

    pub async fn formulate(
        &self,
        history: &[Message],
        prior_attempts: &[PriorAttempt],
    ) -> Result<FormulatedQuery, QueryError> {
        let prompt = build_prompt(history, prior_attempts);
        let raw = self
            .model
            .complete(&prompt, &self.config)
            .await
            .map_err(|_| QueryError::ModelUnavailable)?;

        Ok(parse_reply(&raw))
    }
}

fn build_prompt(history: &[Message], prior_attempts: &[PriorAttempt]) -> String {
    let transcript: String = history
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "Formulate a search query (<= {} chars) and metadata (keywords, entities, intent) \
         as JSON {{\"query\":..,\"keywords\":[..],\"entities\":[..],\"intent\":..}} from this \
         conversation:\n{}\n",
        MAX_QUERY_LEN, transcript
    );

    if !prior_attempts.is_empty() {
        prompt.push_str("\nPrior attempts and their evaluator feedback (narrow, broaden, or re-aim accordingly):\n");
        for attempt in prior_attempts {
            prompt.push_str(&format!(
                "- attempt {}: query=\"{}\" feedback=\"{}\"\n",
                attempt.attempt_index, attempt.query, attempt.feedback
            ));
        }
    }

    prompt
}

fn parse_reply(raw: &str) -> FormulatedQuery {
    let parsed: ModelQueryReply = serde_json::from_str(raw).unwrap_or_default();

    let mut query = if parsed.query.is_empty() {
        raw.trim().to_string()
    } else {
        parsed.query
    };
    if query.len() > MAX_QUERY_LEN {
        query.truncate(MAX_QUERY_LEN);
    }

    let mut metadata = HashMap::new();
    metadata.insert("keywords".to_string(), parsed.keywords);
    metadata.insert("entities".to_string(), parsed.entities);
    metadata.insert(
        "intent".to_string(),
        parsed.intent.map(|i| vec![i]).unwrap_or_default(),
    );

    FormulatedQuery {
        optimized_query: query,
        metadata,
    }
}
