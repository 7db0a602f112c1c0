//! Public web source adapter
//!
//! Uses a primary strategy (site-scoped web search) and an internal fallback
//! strategy (native site search). Which strategy served the request, and
//! whether the fallback was needed, is an adapter-internal concern — C3
//! only sees the merged result list and an optional top-level error kind.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{AdapterOutcome, SourceAdapter};
use crate::state::SourceResult;

/// One way of searching a public site. Implementations plug in the actual
/// HTML scraping / search-engine call, which is external to this crate.
#[async_trait]
pub trait WebSearchStrategy: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SourceResult>, String>;
}

/// Strategy that never finds anything — the safe default until a real
/// scraper is wired in.
pub struct NullStrategy;

#[async_trait]
impl WebSearchStrategy for NullStrategy {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SourceResult>, String> {
        Ok(Vec::new())
    }
}

pub struct PublicWebAdapter {
    tag: String,
    base_url: String,
    primary: Arc<dyn WebSearchStrategy>,
    fallback: Arc<dyn WebSearchStrategy>,
}

impl PublicWebAdapter {
    pub fn new(tag: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            base_url: base_url.into(),
            primary: Arc::new(NullStrategy),
            fallback: Arc::new(NullStrategy),
        }
    }

    pub fn with_strategies(
        mut self,
        primary: Arc<dyn WebSearchStrategy>,
        fallback: Arc<dyn WebSearchStrategy>,
    ) -> Self {
        self.primary = primary;
        self.fallback = fallback;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SourceAdapter for PublicWebAdapter {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn search(&self, query: &str, k: usize, deadline: Duration) -> AdapterOutcome {
        let attempt = tokio::time::timeout(deadline, self.primary.search(query, k));
        match attempt.await {
            Ok(Ok(results)) if !results.is_empty() => AdapterOutcome::ok(results),
            Ok(Ok(_empty)) | Ok(Err(_)) => {
                match tokio::time::timeout(deadline, self.fallback.search(query, k)).await {
                    Ok(Ok(results)) => AdapterOutcome::ok(results),
                    Ok(Err(e)) => AdapterOutcome::error(e),
                    Err(_) => AdapterOutcome::error("timeout"),
                }
            }
            Err(_) => AdapterOutcome::error("timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrategy(Vec<SourceResult>);

    #[async_trait]
    impl WebSearchStrategy for FixedStrategy {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SourceResult>, String> {
            Ok(self.0.clone())
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl WebSearchStrategy for FailingStrategy {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SourceResult>, String> {
            Err("site unreachable".to_string())
        }
    }

    fn result(url: &str) -> SourceResult {
        SourceResult {
            source_tag: "fidelity".to_string(),
            title: "t".to_string(),
            url: url.to_string(),
            snippet: "s".to_string(),
            relevance: 0.9,
        }
    }

    #[tokio::test]
    async fn primary_result_used_when_available() {
        let adapter = PublicWebAdapter::new("fidelity", "https://fidelity.example").with_strategies(
            Arc::new(FixedStrategy(vec![result("https://fidelity.example/a")])),
            Arc::new(FailingStrategy),
        );
        let outcome = adapter.search("q", 5, Duration::from_secs(1)).await;
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.error_kind.is_none());
    }

    #[tokio::test]
    async fn falls_back_when_primary_empty() {
        let adapter = PublicWebAdapter::new("fidelity", "https://fidelity.example").with_strategies(
            Arc::new(FixedStrategy(vec![])),
            Arc::new(FixedStrategy(vec![result("https://fidelity.example/b")])),
        );
        let outcome = adapter.search("q", 5, Duration::from_secs(1)).await;
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn error_when_both_strategies_fail() {
        let adapter = PublicWebAdapter::new("fidelity", "https://fidelity.example")
            .with_strategies(Arc::new(FailingStrategy), Arc::new(FailingStrategy));
        let outcome = adapter.search("q", 5, Duration::from_secs(1)).await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.error_kind.as_deref(), Some("site unreachable"));
    }
}
