//! Source adapter interface and the concrete adapter families (C3)
//!
//! Each source is an implementation of `Search(query, k, deadline) ->
//! (results, error)`. Adapters are registered once at startup with a stable
//! preference order; that order is the tie-breaker the fan-out merge uses
//! when two results carry the same relevance score.

pub mod internal;
pub mod registry;
pub mod semantic;
pub mod web;

use std::time::Duration;

use async_trait::async_trait;

use crate::state::SourceResult;

pub use internal::InternalKnowledgeAdapter;
pub use registry::AdapterRegistry;
pub use semantic::SemanticIndexAdapter;
pub use web::PublicWebAdapter;

/// A single content source reachable by the fan-out stage.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable tag used for dedup tie-breaking, error-map keys, and result
    /// `source_tag` fields (e.g. `fidelity`, `mygps`, `index`).
    fn tag(&self) -> &str;

    /// Search this source. Must never panic or block past `deadline`;
    /// adapter-internal retries/fallback happen inside this call and are
    /// not visible to the fan-out stage.
    async fn search(&self, query: &str, k: usize, deadline: Duration) -> AdapterOutcome;
}

/// Result of one adapter invocation: either results (possibly empty) or an
/// error kind. Adapters never "fail" the whole fan-out — a failing adapter
/// simply contributes zero results and a recorded error kind.
#[derive(Debug, Clone, Default)]
pub struct AdapterOutcome {
    pub results: Vec<SourceResult>,
    pub error_kind: Option<String>,
}

impl AdapterOutcome {
    pub fn ok(results: Vec<SourceResult>) -> Self {
        Self {
            results,
            error_kind: None,
        }
    }

    pub fn error(kind: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            error_kind: Some(kind.into()),
        }
    }
}
