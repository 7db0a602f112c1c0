//! Column family definitions for RocksDB-backed persistence
//!
//! Each column family provides logical separation of data types
//! while sharing the same RocksDB instance.

/// Column family for conversations
pub const CF_CONVERSATIONS: &str = "conversations";

/// Column family for messages
pub const CF_MESSAGES: &str = "messages";

/// Column family for workflow runs
pub const CF_RUNS: &str = "runs";

/// Column family for run attempts
pub const CF_ATTEMPTS: &str = "attempts";

/// Column family for resolutions
pub const CF_RESOLUTIONS: &str = "resolutions";

/// Column family for event history
pub const CF_EVENTS: &str = "events";

/// All column family names
pub const ALL_CFS: &[&str] = &[
    CF_CONVERSATIONS,
    CF_MESSAGES,
    CF_RUNS,
    CF_ATTEMPTS,
    CF_RESOLUTIONS,
    CF_EVENTS,
];

/// Key prefixes for compound keys
pub mod keys {
    /// Create a conversation key
    pub fn conversation(conversation_id: &str) -> String {
        format!("conv:{}", conversation_id)
    }

    /// Create a message key (conversation + zero-padded sequence, for ordering)
    pub fn message(conversation_id: &str, sequence: u64) -> String {
        format!("msg:{}:{:020}", conversation_id, sequence)
    }

    /// Create a run key
    pub fn run(run_id: &str) -> String {
        format!("run:{}", run_id)
    }

    /// Create an attempt key (run + 1-based attempt index)
    pub fn attempt(run_id: &str, attempt_index: u32) -> String {
        format!("attempt:{}:{:06}", run_id, attempt_index)
    }

    /// Create a resolution key
    pub fn resolution(resolution_id: &str) -> String {
        format!("resolution:{}", resolution_id)
    }

    /// Create an event key (timestamp-based for ordering)
    pub fn event(timestamp_nanos: i64, event_id: &str) -> String {
        format!("evt:{:020}:{}", timestamp_nanos, event_id)
    }

    /// Parse event timestamp from key
    pub fn parse_event_timestamp(key: &str) -> Option<i64> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() >= 2 && parts[0] == "evt" {
            parts[1].parse().ok()
        } else {
            None
        }
    }
}
