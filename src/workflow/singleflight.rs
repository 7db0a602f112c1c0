//! Single-flight guard — at most one in-flight run per conversation
//!
//! Grounded on the registry pattern elsewhere in this crate: a guarded map
//! keyed by conversation, with an RAII guard releasing the slot on drop so
//! a panicking or cancelled run still frees the conversation for the next
//! request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::state::{ConversationId, RunId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SingleFlightError {
    #[error("run_in_progress")]
    RunInProgress,
}

struct Inner {
    active: Mutex<HashMap<ConversationId, RunId>>,
}

/// Registry of in-flight runs, one per conversation.
#[derive(Clone)]
pub struct SingleFlightRegistry {
    inner: Arc<Inner>,
}

impl SingleFlightRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Claim the slot for `conversation_id`, or fail if a run is already
    /// in flight for it. The returned guard releases the slot on drop.
    pub fn try_acquire(
        &self,
        conversation_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Result<SingleFlightGuard, SingleFlightError> {
        let conversation_id = conversation_id.into();
        let mut active = self.inner.active.lock().unwrap();
        if active.contains_key(&conversation_id) {
            return Err(SingleFlightError::RunInProgress);
        }
        active.insert(conversation_id.clone(), run_id.into());
        drop(active);

        Ok(SingleFlightGuard {
            inner: Arc::clone(&self.inner),
            conversation_id,
        })
    }

    pub fn in_flight_run(&self, conversation_id: &str) -> Option<RunId> {
        self.inner.active.lock().unwrap().get(conversation_id).cloned()
    }
}

impl Default for SingleFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the single-flight claim for one conversation; releases it on drop
/// regardless of whether the run completed, errored, or panicked.
pub struct SingleFlightGuard {
    inner: Arc<Inner>,
    conversation_id: ConversationId,
}

impl Drop for SingleFlightGuard {
    fn drop(&mut self) {
        self.inner.active.lock().unwrap().remove(&self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_conversation_is_rejected() {
        let registry = SingleFlightRegistry::new();
        let _guard = registry.try_acquire("c1", "r1").unwrap();
        let err = registry.try_acquire("c1", "r2").unwrap_err();
        assert_eq!(err, SingleFlightError::RunInProgress);
    }

    #[test]
    fn different_conversations_do_not_contend() {
        let registry = SingleFlightRegistry::new();
        let _g1 = registry.try_acquire("c1", "r1").unwrap();
        let _g2 = registry.try_acquire("c2", "r2").unwrap();
    }

    #[test]
    fn dropping_the_guard_frees_the_slot() {
        let registry = SingleFlightRegistry::new();
        {
            let _guard = registry.try_acquire("c1", "r1").unwrap();
            assert_eq!(registry.in_flight_run("c1"), Some("r1".to_string()));
        }
        assert_eq!(registry.in_flight_run("c1"), None);
        let _guard2 = registry.try_acquire("c1", "r2").unwrap();
    }

    #[test]
    fn guard_frees_slot_even_on_panic_unwind() {
        let registry = SingleFlightRegistry::new();
        let registry_clone = registry.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = registry_clone.try_acquire("c1", "r1").unwrap();
            panic!("simulated failure mid-run");
        });
        assert!(result.is_err());
        assert_eq!(registry.in_flight_run("c1"), None);
    }
}
