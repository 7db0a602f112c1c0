//! Internal knowledge source adapter
//!
//! Requires credentialed access. Contributes zero results and an
//! `unauthorized` error kind when credentials are absent — this must never
//! be treated as a workflow failure, only as a per-source error entry.

use std::time::Duration;

use async_trait::async_trait;

use super::{AdapterOutcome, SourceAdapter};
use crate::state::SourceResult;

/// Looks up results once credentials are present. External to this crate;
/// the default does nothing interesting, it only demonstrates the contract.
pub trait CredentialedLookup: Send + Sync {
    fn lookup(&self, query: &str, k: usize) -> Vec<SourceResult>;
}

pub struct StaticLookup(pub Vec<SourceResult>);

impl CredentialedLookup for StaticLookup {
    fn lookup(&self, _query: &str, k: usize) -> Vec<SourceResult> {
        self.0.iter().take(k).cloned().collect()
    }
}

pub struct InternalKnowledgeAdapter {
    tag: String,
    credentials: Option<String>,
    lookup: Box<dyn CredentialedLookup>,
}

impl InternalKnowledgeAdapter {
    pub fn new(tag: impl Into<String>, credentials: Option<String>) -> Self {
        Self {
            tag: tag.into(),
            credentials,
            lookup: Box::new(StaticLookup(Vec::new())),
        }
    }

    pub fn with_lookup(mut self, lookup: Box<dyn CredentialedLookup>) -> Self {
        self.lookup = lookup;
        self
    }
}

#[async_trait]
impl SourceAdapter for InternalKnowledgeAdapter {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn search(&self, query: &str, k: usize, _deadline: Duration) -> AdapterOutcome {
        if self.credentials.is_none() {
            return AdapterOutcome::error("unauthorized");
        }
        AdapterOutcome::ok(self.lookup.lookup(query, k))
    }
}
