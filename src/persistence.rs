//! Persistence port
//!
//! Generalizes the RocksDB-backed [`crate::state::StateStore`] behind the
//! narrow interface the Workflow Engine actually needs. Writes are awaited
//! (every persistence write is a suspension point — see the concurrency
//! model) even though the underlying store is blocking I/O: calls are
//! dispatched onto the blocking thread pool so they never stall the
//! executor.

use std::sync::Arc;

use async_trait::async_trait;

use crate::state::{Conversation, Message, Resolution, RunAttempt, SharedStateStore, StoreError, WorkflowRun};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("conversation_not_found")]
    ConversationNotFound,

    #[error("background task failed: {0}")]
    TaskJoin(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// The abstract persistence seam the Workflow Engine depends on. Every
/// method is idempotent by primary key: replaying a write with identical
/// inputs is a no-op at storage level.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn save_run(&self, run: &WorkflowRun) -> PersistenceResult<()>;
    async fn save_attempt(&self, attempt: &RunAttempt) -> PersistenceResult<()>;
    async fn save_resolution(&self, resolution: &Resolution) -> PersistenceResult<()>;
    async fn load_conversation(&self, conversation_id: &str) -> PersistenceResult<Conversation>;
    async fn load_messages(&self, conversation_id: &str) -> PersistenceResult<Vec<Message>>;
    async fn mark_abandoned_runs_aborted(&self) -> PersistenceResult<usize>;
}

/// Production implementation backed by the RocksDB state store.
pub struct RocksPersistence {
    store: SharedStateStore,
}

impl RocksPersistence {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistencePort for RocksPersistence {
    async fn save_run(&self, run: &WorkflowRun) -> PersistenceResult<()> {
        let store = Arc::clone(&self.store);
        let run = run.clone();
        spawn_blocking_store(move || store.put_run(&run)).await
    }

    async fn save_attempt(&self, attempt: &RunAttempt) -> PersistenceResult<()> {
        let store = Arc::clone(&self.store);
        let attempt = attempt.clone();
        spawn_blocking_store(move || store.put_attempt(&attempt)).await
    }

    async fn save_resolution(&self, resolution: &Resolution) -> PersistenceResult<()> {
        let store = Arc::clone(&self.store);
        let resolution = resolution.clone();
        spawn_blocking_store(move || store.put_resolution(&resolution)).await
    }

    async fn load_conversation(&self, conversation_id: &str) -> PersistenceResult<Conversation> {
        let store = Arc::clone(&self.store);
        let conversation_id = conversation_id.to_string();
        let conversation = spawn_blocking_store(move || store.get_conversation(&conversation_id)).await?;
        conversation.ok_or(PersistenceError::ConversationNotFound)
    }

    async fn load_messages(&self, conversation_id: &str) -> PersistenceResult<Vec<Message>> {
        let store = Arc::clone(&self.store);
        let conversation_id = conversation_id.to_string();
        spawn_blocking_store(move || store.get_conversation_messages(&conversation_id)).await
    }

    async fn mark_abandoned_runs_aborted(&self) -> PersistenceResult<usize> {
        let store = Arc::clone(&self.store);
        spawn_blocking_store(move || store.mark_abandoned_runs_aborted()).await
    }
}

async fn spawn_blocking_store<F, T>(f: F) -> PersistenceResult<T>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PersistenceError::TaskJoin(e.to_string()))?
        .map_err(PersistenceError::from)
}
