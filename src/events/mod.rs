//! Event streaming for the rep assistance orchestrator
//!
//! The Workflow Engine publishes a typed progress event at every state
//! boundary. Delivery is fire-and-forget with bounded per-conversation
//! buffering: a slow or absent subscriber never blocks workflow progress,
//! it only loses the oldest pending event for that conversation.
//!
//! # Components
//!
//! - `types`: the `WorkflowEvent`/`WorkflowEventKind` wire shape.
//! - `bus`: the bounded, per-conversation pub/sub, with optional
//!   persistence to RocksDB.
//! - `history`: query/replay of persisted events (e.g. for a reconnecting
//!   UI client to catch up on what it missed).

pub mod bus;
pub mod history;
pub mod types;

pub use bus::{EventBus, EventBusError, EventBusResult, EventSubscription, SharedEventBus};
pub use history::{EventHistory, HistoryError, HistoryResult};
pub use types::{EventId, WorkflowEvent, WorkflowEventKind};
