//! Event history and replay from RocksDB
//!
//! Provides query and replay access to the event log persisted by
//! [`super::bus::EventBus`], for debugging and UI reconnection (a
//! reconnecting client replays missed events instead of losing them).

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::types::WorkflowEvent;
use crate::state::SharedStateStore;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("store error: {0}")]
    StoreError(String),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

pub struct EventHistory {
    store: SharedStateStore,
}

impl EventHistory {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    pub fn get_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> HistoryResult<Vec<WorkflowEvent>> {
        let start_nanos = start.timestamp_nanos_opt().unwrap_or(0);
        let end_nanos = end.timestamp_nanos_opt().unwrap_or(i64::MAX);

        let events: Vec<WorkflowEvent> = self
            .store
            .get_events_range(start_nanos, end_nanos)
            .map_err(|e| HistoryError::StoreError(e.to_string()))?
            .into_iter()
            .map(|(_, event)| event)
            .collect();

        debug!(count = events.len(), "retrieved events from history");
        Ok(events)
    }

    pub fn get_recent_events(&self, minutes: i64) -> HistoryResult<Vec<WorkflowEvent>> {
        let end = Utc::now();
        let start = end - Duration::minutes(minutes);
        self.get_events(start, end)
    }

    /// Events for a single conversation within the last 24 hours.
    pub fn get_conversation_events(&self, conversation_id: &str) -> HistoryResult<Vec<WorkflowEvent>> {
        let all_events = self.get_recent_events(60 * 24)?;
        Ok(all_events
            .into_iter()
            .filter(|e| e.conversation_id == conversation_id)
            .collect())
    }

    /// Events for a single run, in persisted order.
    pub fn get_run_events(&self, run_id: &str) -> HistoryResult<Vec<WorkflowEvent>> {
        let all_events = self.get_recent_events(60 * 24)?;
        Ok(all_events.into_iter().filter(|e| e.run_id() == run_id).collect())
    }

    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> HistoryResult<usize> {
        let cutoff_nanos = cutoff.timestamp_nanos_opt().unwrap_or(0);
        let count = self
            .store
            .prune_events_before(cutoff_nanos)
            .map_err(|e| HistoryError::StoreError(e.to_string()))?;
        info!(count, cutoff = %cutoff, "pruned old events");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::WorkflowEventKind;
    use crate::state::StateStore;
    use tempfile::tempdir;

    fn test_history() -> (EventHistory, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("test.db")).unwrap().shared();
        (EventHistory::new(store), dir)
    }

    #[test]
    fn filters_events_by_conversation() {
        let (history, _dir) = test_history();
        history
            .store
            .put_event(
                1,
                "c1:workflow_started",
                &WorkflowEvent::new("c1", WorkflowEventKind::WorkflowStarted { run_id: "r1".into() }),
            )
            .unwrap();
        history
            .store
            .put_event(
                2,
                "c2:workflow_started",
                &WorkflowEvent::new("c2", WorkflowEventKind::WorkflowStarted { run_id: "r2".into() }),
            )
            .unwrap();

        let events = history.get_conversation_events("c1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].conversation_id, "c1");
    }
}
