//! Resolution Generator (C4)
//!
//! Produces a customer-ready answer with inline citations from the
//! collected source snippets, then post-validates every citation against
//! the input SourceResult list before returning.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{LanguageModel, ModelConfig};
use crate::query::PriorAttempt;
use crate::state::{Citation, SourceResult};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no_sources")]
    NoSources,
    #[error("model_unavailable")]
    ModelUnavailable,
}

/// Output of resolution generation. `citation_invalid` is not an error
/// variant: per contract, an attempt with fabricated citations is sealed
/// with that verdict rather than re-invoking the model.
#[derive(Debug, Clone)]
pub struct GeneratedResolution {
    pub resolution_text: String,
    pub citations: Vec<Citation>,
    pub citation_invalid: bool,
}

pub struct ResolutionGenerator {
    model: Arc<dyn LanguageModel>,
    config: ModelConfig,
    require_grounding: bool,
}

impl ResolutionGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, model_tag: impl Into<String>) -> Self {
        Self {
            model,
            config: ModelConfig::new(model_tag).with_max_tokens(1200),
            require_grounding: true,
        }
    }

    pub async fn generate(
        &self,
        query: &str,
        sources: &[SourceResult],
        prior_attempts: &[PriorAttempt],
    ) -> Result<GeneratedResolution, ResolutionError> {
        if sources.is_empty() && self.require_grounding {
            return Err(ResolutionError::NoSources);
        }

        let prompt = build_prompt(query, sources, prior_attempts);
        let raw = self
            .model
            .complete(&prompt, &self.config)
            .await
            .map_err(|_| ResolutionError::ModelUnavailable)?;

        Ok(validate_citations(raw, sources))
    }
}

fn build_prompt(query: &str, sources: &[SourceResult], prior_attempts: &[PriorAttempt]) -> String {
    let mut prompt = format!(
        "Write a 2-4 paragraph answer (soft max ~800 words) to the query \"{}\" using only the \
         following sources. Cite every factual claim inline with the marker \
         `[Source: <url>]`, using exactly the URLs given:\n",
        query
    );
    for s in sources {
        prompt.push_str(&format!("- {} ({}): {}\n", s.title, s.url, s.snippet));
    }
    if !prior_attempts.is_empty() {
        prompt.push_str("\nPrevious attempts were rejected for:\n");
        for attempt in prior_attempts {
            prompt.push_str(&format!("- {}\n", attempt.feedback));
        }
    }
    prompt
}

/// Extract `[Source: <url>]` markers, keep only citations whose URL is
/// actually present in the input source list, and flag whether any were
/// discarded.
fn validate_citations(resolution_text: String, sources: &[SourceResult]) -> GeneratedResolution {
    let known: HashMap<&str, &str> = sources.iter().map(|s| (s.url.as_str(), s.title.as_str())).collect();

    let mut citations = Vec::new();
    let mut citation_invalid = false;
    let mut seen = std::collections::HashSet::new();

    for marker in extract_markers(&resolution_text) {
        match known.get(marker.as_str()) {
            Some(title) if seen.insert(marker.clone()) => {
                citations.push(Citation {
                    label: title.to_string(),
                    url: marker,
                });
            }
            Some(_) => {} // duplicate marker, already recorded
            None => citation_invalid = true,
        }
    }

    GeneratedResolution {
        resolution_text,
        citations,
        citation_invalid,
    }
}

fn extract_markers(text: &str) -> Vec<String> {
    let mut markers = Vec::new();
    let needle = "[Source: ";
    let mut rest = text;
    while let Some(start) = rest.find(needle) {
        let after = &rest[start + needle.len()..];
        if let Some(end) = after.find(']') {
            markers.push(after[..end].trim().to_string());
            rest = &after[end + 1..];
        } else {
            break;
        }
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::ScriptedModel;
    use crate::model::ModelError;

    fn source(url: &str) -> SourceResult {
        SourceResult {
            source_tag: "fidelity".to_string(),
            title: "Fidelity Help".to_string(),
            url: url.to_string(),
            snippet: "snippet".to_string(),
            relevance: 0.9,
        }
    }

    #[tokio::test]
    async fn empty_sources_fails_with_no_sources() {
        let model = ScriptedModel::new(vec![]);
        let gen = ResolutionGenerator::new(Arc::new(model), "gen-model");
        let err = gen.generate("q", &[], &[]).await.unwrap_err();
        assert_eq!(err, ResolutionError::NoSources);
    }

    #[tokio::test]
    async fn valid_citation_is_kept() {
        let src = source("https://fidelity.example/reset");
        let model = ScriptedModel::new(vec![Ok(
            "To reset, go here [Source: https://fidelity.example/reset].".to_string(),
        )]);
        let gen = ResolutionGenerator::new(Arc::new(model), "gen-model");
        let result = gen.generate("q", &[src], &[]).await.unwrap();
        assert_eq!(result.citations.len(), 1);
        assert!(!result.citation_invalid);
    }

    #[tokio::test]
    async fn fabricated_citation_is_discarded_and_flagged() {
        let src = source("https://fidelity.example/reset");
        let model = ScriptedModel::new(vec![Ok(
            "See [Source: https://fidelity.example/reset] and also [Source: https://made-up.example/x].".to_string(),
        )]);
        let gen = ResolutionGenerator::new(Arc::new(model), "gen-model");
        let result = gen.generate("q", &[src], &[]).await.unwrap();
        assert_eq!(result.citations.len(), 1);
        assert!(result.citation_invalid);
    }

    #[tokio::test]
    async fn model_error_surfaces_as_model_unavailable() {
        let model = ScriptedModel::new(vec![Err(ModelError::Timeout)]);
        let gen = ResolutionGenerator::new(Arc::new(model), "gen-model");
        let err = gen.generate("q", &[source("https://x.example")], &[]).await.unwrap_err();
        assert_eq!(err, ResolutionError::ModelUnavailable);
    }

    #[test]
    fn extract_markers_handles_multiple_citations() {
        let text = "a [Source: url1] b [Source: url2] c";
        let markers = extract_markers(text);
        assert_eq!(markers, vec!["url1".to_string(), "url2".to_string()]);
    }
}
