//! Semantic index source adapter (optional)
//!
//! Searches previously-ingested content via a vector/keyword index. The
//! index itself is external to this crate (out of scope per the core's
//! contract); this adapter only shapes the index's hits into SourceResults.

use std::time::Duration;

use async_trait::async_trait;

use super::{AdapterOutcome, SourceAdapter};
use crate::state::SourceResult;

/// A previously-ingested index this adapter queries.
pub trait SemanticIndex: Send + Sync {
    fn query(&self, query: &str, k: usize) -> Result<Vec<SourceResult>, String>;
}

pub struct EmptyIndex;

impl SemanticIndex for EmptyIndex {
    fn query(&self, _query: &str, _k: usize) -> Result<Vec<SourceResult>, String> {
        Ok(Vec::new())
    }
}

pub struct SemanticIndexAdapter {
    tag: String,
    index: Box<dyn SemanticIndex>,
}

impl SemanticIndexAdapter {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            index: Box::new(EmptyIndex),
        }
    }

    pub fn with_index(mut self, index: Box<dyn SemanticIndex>) -> Self {
        self.index = index;
        self
    }
}

#[async_trait]
impl SourceAdapter for SemanticIndexAdapter {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn search(&self, query: &str, k: usize, _deadline: Duration) -> AdapterOutcome {
        match self.index.query(query, k) {
            Ok(results) => AdapterOutcome::ok(results),
            Err(e) => AdapterOutcome::error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_index_returns_no_results_and_no_error() {
        let adapter = SemanticIndexAdapter::new("index");
        let outcome = adapter.search("q", 5, Duration::from_secs(1)).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.error_kind.is_none());
    }
}
