//! Source Fan-Out (C3)
//!
//! Invokes all registered source adapters concurrently, collects results,
//! deduplicates, and bounds content size. Never fails as a whole: a source
//! timing out or erroring contributes zero results and a recorded error.

use std::collections::HashMap;
use std::time::Duration;

use crate::source::AdapterRegistry;
use crate::state::SourceResult;

const DEFAULT_SNIPPET_BYTE_BUDGET: usize = 2048;

#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    pub results: Vec<SourceResult>,
    pub errors: HashMap<String, String>,
}

pub struct SourceFanOut<'a> {
    registry: &'a AdapterRegistry,
    snippet_byte_budget: usize,
}

impl<'a> SourceFanOut<'a> {
    pub fn new(registry: &'a AdapterRegistry) -> Self {
        Self {
            registry,
            snippet_byte_budget: DEFAULT_SNIPPET_BYTE_BUDGET,
        }
    }

    pub fn with_snippet_byte_budget(mut self, budget: usize) -> Self {
        self.snippet_byte_budget = budget;
        self
    }

    /// Run every registered adapter concurrently, cancel stragglers at the
    /// deadline, and merge into a single deduplicated, relevance-sorted list.
    pub async fn search(&self, query: &str, k: usize, deadline: Duration) -> FanOutResult {
        let adapters = self.registry.adapters();
        let query = query.to_string();

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let query = query.clone();
            let tag = adapter.tag().to_string();
            handles.push(tokio::spawn(async move {
                let started = std::time::Instant::now();
                let outcome = tokio::time::timeout(deadline, adapter.search(&query, k, deadline)).await;
                (tag, outcome, started.elapsed())
            }));
        }

        let mut errors = HashMap::new();
        let mut all_results: Vec<SourceResult> = Vec::new();

        for handle in handles {
            match handle.await {
                Ok((tag, Ok(outcome), elapsed)) => {
                    if let Some(err) = outcome.error_kind {
                        errors.insert(tag.clone(), err);
                        self.registry.record_failure(&tag);
                    } else {
                        self.registry.record_success(&tag, elapsed.as_millis() as u64);
                    }
                    all_results.extend(outcome.results);
                }
                Ok((tag, Err(_elapsed), _)) => {
                    errors.insert(tag.clone(), "timeout".to_string());
                    self.registry.record_failure(&tag);
                }
                Err(_join_error) => {
                    // a panicking adapter task contributes nothing; it has no tag to record here
                }
            }
        }

        for result in &mut all_results {
            truncate_snippet(&mut result.snippet, self.snippet_byte_budget);
        }

        let merged = self.merge(all_results);

        FanOutResult {
            results: merged,
            errors,
        }
    }

    /// Deduplicate by canonical URL (keep higher relevance, earlier
    /// preference order on ties) then sort by descending relevance, with
    /// preference order and original rank breaking ties.
    fn merge(&self, results: Vec<SourceResult>) -> Vec<SourceResult> {
        let mut by_url: HashMap<String, (usize, SourceResult)> = HashMap::new();

        for (original_rank, result) in results.into_iter().enumerate() {
            let canonical = result.canonical_url();
            let pref_rank = self.registry.preference_rank(&result.source_tag);

            match by_url.get(&canonical) {
                Some((_existing_rank, existing)) => {
                    let existing_pref = self.registry.preference_rank(&existing.source_tag);
                    let replace = result.relevance > existing.relevance
                        || (result.relevance == existing.relevance && pref_rank < existing_pref);
                    if replace {
                        by_url.insert(canonical, (original_rank, result));
                    }
                }
                None => {
                    by_url.insert(canonical, (original_rank, result));
                }
            }
        }

        let mut merged: Vec<(usize, usize, SourceResult)> = by_url
            .into_values()
            .map(|(rank, result)| {
                let pref = self.registry.preference_rank(&result.source_tag);
                (pref, rank, result)
            })
            .collect();

        merged.sort_by(|a, b| {
            b.2.relevance
                .partial_cmp(&a.2.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });

        merged.into_iter().map(|(_, _, r)| r).collect()
    }
}

fn truncate_snippet(snippet: &mut String, byte_budget: usize) {
    if snippet.len() <= byte_budget {
        return;
    }
    let mut boundary = byte_budget;
    while boundary > 0 && !snippet.is_char_boundary(boundary) {
        boundary -= 1;
    }
    snippet.truncate(boundary);
}
