//! Event bus for the rep assistance orchestrator
//!
//! Provides a bounded, per-conversation channel with optional persistence to
//! RocksDB for replay. Unlike a broadcast channel shared across every
//! conversation, each conversation gets its own bounded buffer so a slow
//! subscriber on one conversation never drops events belonging to another.
//! On overflow, the oldest pending event for that conversation is dropped
//! (newest-wins) and a per-conversation counter is incremented; `publish`
//! itself never blocks and never fails the caller.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::{debug, warn};

use super::types::WorkflowEvent;
use crate::state::{ConversationId, SharedStateStore};

/// Default number of pending events buffered per conversation.
const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("failed to persist event: {0}")]
    PersistFailed(String),
}

pub type EventBusResult<T> = Result<T, EventBusError>;

pub type SharedEventBus = Arc<EventBus>;

struct ConversationQueue {
    events: Mutex<VecDeque<WorkflowEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    capacity: usize,
}

impl ConversationQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            capacity,
        }
    }

    fn push(&self, event: WorkflowEvent) {
        let mut events = self.events.lock().unwrap();
        if events.len() >= self.capacity {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
        drop(events);
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<WorkflowEvent> {
        self.events.lock().unwrap().pop_front()
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded, per-conversation pub/sub with optional persistence.
pub struct EventBus {
    queues: Mutex<HashMap<ConversationId, Arc<ConversationQueue>>>,
    capacity: usize,
    store: Option<SharedStateStore>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: DEFAULT_CAPACITY,
            store: None,
        }
    }

    pub fn with_persistence(store: SharedStateStore) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: DEFAULT_CAPACITY,
            store: Some(store),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    fn queue_for(&self, conversation_id: &str) -> Arc<ConversationQueue> {
        let mut queues = self.queues.lock().unwrap();
        queues
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(ConversationQueue::new(self.capacity)))
            .clone()
    }

    /// Publish an event. Never blocks; on a full buffer, drops the oldest
    /// pending event for this conversation instead.
    pub fn publish(&self, event: WorkflowEvent) -> EventBusResult<()> {
        let event_type = event.event_type();
        let conversation_id = event.conversation_id.clone();

        if let Some(store) = &self.store {
            let nanos = event.timestamp.timestamp_nanos_opt().unwrap_or(0);
            let event_id = format!("{}:{}", conversation_id, event_type);
            if let Err(e) = store.put_event(nanos, &event_id, &event) {
                warn!(event_type, %conversation_id, "failed to persist event: {}", e);
                return Err(EventBusError::PersistFailed(e.to_string()));
            }
        }

        let queue = self.queue_for(&conversation_id);
        let was_full = queue.events.lock().unwrap().len() >= self.capacity;
        queue.push(event);
        if was_full {
            debug!(event_type, %conversation_id, "event buffer full, dropped oldest pending event");
        }
        Ok(())
    }

    /// Subscribe to a conversation's event stream. A conversation is
    /// expected to have at most one active subscriber at a time, matching
    /// the single-flight run it streams progress for.
    pub fn subscribe(&self, conversation_id: &str) -> EventSubscription {
        EventSubscription {
            queue: self.queue_for(conversation_id),
        }
    }

    /// Number of events dropped for newest-wins overflow on this conversation.
    pub fn dropped_count(&self, conversation_id: &str) -> u64 {
        self.queue_for(conversation_id).dropped_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscription {
    queue: Arc<ConversationQueue>,
}

impl EventSubscription {
    /// Wait for the next event. Drains any already-buffered events first.
    pub async fn recv(&mut self) -> WorkflowEvent {
        loop {
            if let Some(event) = self.queue.try_pop() {
                return event;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Drain everything currently buffered without waiting.
    pub fn drain(&mut self) -> Vec<WorkflowEvent> {
        let mut events = self.queue.events.lock().unwrap();
        events.drain(..).collect()
    }
}
