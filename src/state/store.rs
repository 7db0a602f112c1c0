//! RocksDB-backed state store for the rep assistance orchestrator
//!
//! Provides persistent storage with column families for logical data
//! separation. Uses bincode for efficient binary serialization internally,
//! except for the event log which is kept as JSON for debuggability.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use super::schema::{self, ALL_CFS};
use super::types::*;

/// Error type for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to StateStore
pub type SharedStateStore = Arc<StateStore>;

/// RocksDB-backed persistent state store
pub struct StateStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl StateStore {
    /// Open or create a state store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let bytes =
            bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_keys(&self, cf_name: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut keys = Vec::new();
        let iter = db.prefix_iterator_cf(&cf, prefix.as_bytes());

        for result in iter {
            let (key, _) = result?;
            if let Ok(key_str) = String::from_utf8(key.to_vec()) {
                if key_str.starts_with(prefix) {
                    keys.push(key_str);
                } else {
                    break;
                }
            }
        }

        Ok(keys)
    }

    // =========================================================================
    // Conversation operations
    // =========================================================================

    pub fn put_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        let key = schema::keys::conversation(&conversation.id);
        self.put(schema::CF_CONVERSATIONS, &key, conversation)
    }

    pub fn get_conversation(&self, conversation_id: &str) -> StoreResult<Option<Conversation>> {
        let key = schema::keys::conversation(conversation_id);
        self.get(schema::CF_CONVERSATIONS, &key)
    }

    // =========================================================================
    // Message operations
    // =========================================================================

    pub fn put_message(&self, message: &Message) -> StoreResult<()> {
        let key = schema::keys::message(&message.conversation_id, message.sequence);
        self.put(schema::CF_MESSAGES, &key, message)
    }

    /// Messages for a conversation, ordered by sequence (the key encoding
    /// zero-pads the sequence so prefix iteration yields them in order).
    pub fn get_conversation_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let prefix = format!("msg:{}:", conversation_id);
        let keys = self.list_keys(schema::CF_MESSAGES, &prefix)?;
        let messages: Vec<Message> = keys
            .iter()
            .filter_map(|key| self.get(schema::CF_MESSAGES, key).ok()?)
            .collect();
        Ok(messages)
    }

    // =========================================================================
    // Run operations
    // =========================================================================

    pub fn put_run(&self, run: &WorkflowRun) -> StoreResult<()> {
        let key = schema::keys::run(&run.id);
        self.put(schema::CF_RUNS, &key, run)
    }

    pub fn get_run(&self, run_id: &str) -> StoreResult<Option<WorkflowRun>> {
        let key = schema::keys::run(run_id);
        self.get(schema::CF_RUNS, &key)
    }

    pub fn list_runs(&self) -> StoreResult<Vec<WorkflowRun>> {
        let keys = self.list_keys(schema::CF_RUNS, "run:")?;
        let runs: Vec<WorkflowRun> = keys
            .iter()
            .filter_map(|key| self.get(schema::CF_RUNS, key).ok()?)
            .collect();
        Ok(runs)
    }

    /// Runs left in a non-terminal state by a previous process, to be
    /// reconciled by the persistence port's startup sweep.
    pub fn list_in_flight_runs(&self) -> StoreResult<Vec<WorkflowRun>> {
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|r| r.is_in_flight())
            .collect())
    }

    // =========================================================================
    // Attempt operations
    // =========================================================================

    pub fn put_attempt(&self, attempt: &RunAttempt) -> StoreResult<()> {
        let key = schema::keys::attempt(&attempt.run_id, attempt.attempt_index);
        self.put(schema::CF_ATTEMPTS, &key, attempt)
    }

    pub fn get_attempt(&self, run_id: &str, attempt_index: u32) -> StoreResult<Option<RunAttempt>> {
        let key = schema::keys::attempt(run_id, attempt_index);
        self.get(schema::CF_ATTEMPTS, &key)
    }

    /// All attempts for a run, in ascending attempt-index order.
    pub fn get_run_attempts(&self, run_id: &str) -> StoreResult<Vec<RunAttempt>> {
        let prefix = format!("attempt:{}:", run_id);
        let keys = self.list_keys(schema::CF_ATTEMPTS, &prefix)?;
        let attempts: Vec<RunAttempt> = keys
            .iter()
            .filter_map(|key| self.get(schema::CF_ATTEMPTS, key).ok()?)
            .collect();
        Ok(attempts)
    }

    // =========================================================================
    // Resolution operations
    // =========================================================================

    pub fn put_resolution(&self, resolution: &Resolution) -> StoreResult<()> {
        let key = schema::keys::resolution(&resolution.id);
        self.put(schema::CF_RESOLUTIONS, &key, resolution)
    }

    pub fn get_resolution(&self, resolution_id: &str) -> StoreResult<Option<Resolution>> {
        let key = schema::keys::resolution(resolution_id);
        self.get(schema::CF_RESOLUTIONS, &key)
    }

    // =========================================================================
    // Event operations (for replay)
    // =========================================================================

    pub fn put_event(
        &self,
        timestamp_nanos: i64,
        event_id: &str,
        event: &impl Serialize,
    ) -> StoreResult<()> {
        let key = schema::keys::event(timestamp_nanos, event_id);
        let bytes =
            serde_json::to_vec(event).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_EVENTS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_EVENTS.to_string()))?;

        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_events_range<T: DeserializeOwned>(
        &self,
        start_nanos: i64,
        end_nanos: i64,
    ) -> StoreResult<Vec<(i64, T)>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_EVENTS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_EVENTS.to_string()))?;

        let start_key = schema::keys::event(start_nanos, "");
        let iter = db.iterator_cf(
            &cf,
            rocksdb::IteratorMode::From(start_key.as_bytes(), rocksdb::Direction::Forward),
        );

        let mut events = Vec::new();
        for result in iter {
            let (key, value) = result?;
            let key_str = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;

            if let Some(ts) = schema::keys::parse_event_timestamp(&key_str) {
                if ts > end_nanos {
                    break;
                }
                let event: T = serde_json::from_slice(&value)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                events.push((ts, event));
            }
        }

        Ok(events)
    }

    pub fn prune_events_before(&self, timestamp_nanos: i64) -> StoreResult<usize> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_EVENTS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_EVENTS.to_string()))?;

        let start_key = schema::keys::event(0, "");
        let end_key = schema::keys::event(timestamp_nanos, "");

        let mut keys_to_delete = Vec::new();
        let iter = db.iterator_cf(
            &cf,
            rocksdb::IteratorMode::From(start_key.as_bytes(), rocksdb::Direction::Forward),
        );

        for result in iter {
            let (key, _) = result?;
            let key_str = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;

            if key_str >= end_key {
                break;
            }
            keys_to_delete.push(key.to_vec());
        }

        let count = keys_to_delete.len();
        for key in keys_to_delete {
            db.delete_cf(&cf, key)?;
        }

        Ok(count)
    }

    /// Startup-time sweep: any run left without a terminal record by a
    /// previous process is marked `aborted`. Not a mid-flight concern.
    pub fn mark_abandoned_runs_aborted(&self) -> StoreResult<usize> {
        let abandoned = self.list_in_flight_runs()?;
        let count = abandoned.len();
        for mut run in abandoned {
            run.seal(WorkflowTerminal::Aborted, Some("cancelled".to_string()), None);
            self.put_run(&run)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_conversation_crud() {
        let (store, _dir) = test_store();
        let conv = Conversation::new("c1", "rep-1", Channel::Chat);
        store.put_conversation(&conv).unwrap();
        let retrieved = store.get_conversation("c1").unwrap().unwrap();
        assert_eq!(retrieved.representative_id, "rep-1");
    }

    #[test]
    fn test_messages_ordered_by_sequence() {
        let (store, _dir) = test_store();
        store
            .put_message(&Message::new("c1", MessageRole::Customer, "hi", 0))
            .unwrap();
        store
            .put_message(&Message::new("c1", MessageRole::Representative, "let me check", 1))
            .unwrap();

        let msgs = store.get_conversation_messages("c1").unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].sequence, 0);
        assert_eq!(msgs[1].sequence, 1);
    }

    #[test]
    fn test_run_and_attempt_crud() {
        let (store, _dir) = test_store();
        let run = WorkflowRun::new("r1", "c1");
        store.put_run(&run).unwrap();

        let attempt = RunAttempt::new("r1", 1);
        store.put_attempt(&attempt).unwrap();

        let retrieved = store.get_run("r1").unwrap().unwrap();
        assert!(retrieved.is_in_flight());

        let attempts = store.get_run_attempts("r1").unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_index, 1);
    }

    #[test]
    fn test_attempts_ordered_ascending() {
        let (store, _dir) = test_store();
        store.put_attempt(&RunAttempt::new("r1", 2)).unwrap();
        store.put_attempt(&RunAttempt::new("r1", 1)).unwrap();

        let attempts = store.get_run_attempts("r1").unwrap();
        assert_eq!(attempts[0].attempt_index, 1);
        assert_eq!(attempts[1].attempt_index, 2);
    }

    #[test]
    fn test_mark_abandoned_runs_aborted() {
        let (store, _dir) = test_store();
        store.put_run(&WorkflowRun::new("r1", "c1")).unwrap();
        let mut finished = WorkflowRun::new("r2", "c2");
        finished.seal(WorkflowTerminal::Succeeded, None, None);
        store.put_run(&finished).unwrap();

        let swept = store.mark_abandoned_runs_aborted().unwrap();
        assert_eq!(swept, 1);

        let r1 = store.get_run("r1").unwrap().unwrap();
        assert_eq!(r1.terminal, Some(WorkflowTerminal::Aborted));
        let r2 = store.get_run("r2").unwrap().unwrap();
        assert_eq!(r2.terminal, Some(WorkflowTerminal::Succeeded));
    }

    #[test]
    fn test_resolution_crud() {
        let (store, _dir) = test_store();
        let res = Resolution::new(
            "res-1",
            "r1",
            1,
            "Here is how [Source: https://example.com] ...",
            vec![Citation {
                label: "Example".to_string(),
                url: "https://example.com".to_string(),
            }],
            std::collections::HashMap::new(),
        );
        store.put_resolution(&res).unwrap();
        let retrieved = store.get_resolution("res-1").unwrap().unwrap();
        assert!(retrieved.pending_review);
    }
}
