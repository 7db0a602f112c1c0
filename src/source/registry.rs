//! Adapter registry — stable preference order plus live health tracking
//!
//! Source adapters are registered once at startup, in the order that will
//! break score ties during the fan-out merge. Health is tracked the same
//! way a provider registry tracks model health: a rolling success rate and
//! average latency, updated after every call.

use std::sync::RwLock;

use super::SourceAdapter;

/// Live health metadata for one registered adapter.
#[derive(Debug, Clone)]
pub struct AdapterHealth {
    pub avg_latency_ms: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl AdapterHealth {
    fn new() -> Self {
        Self {
            avg_latency_ms: 0,
            success_count: 0,
            error_count: 0,
        }
    }

    pub fn success_rate(&self) -> f32 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f32 / total as f32
        }
    }

    fn record_success(&mut self, latency_ms: u64) {
        self.avg_latency_ms =
            (self.avg_latency_ms * self.success_count + latency_ms) / (self.success_count + 1);
        self.success_count += 1;
    }

    fn record_failure(&mut self) {
        self.error_count += 1;
    }
}

struct Entry {
    adapter: std::sync::Arc<dyn SourceAdapter>,
    health: AdapterHealth,
}

/// Registry of source adapters in their registration (preference) order.
pub struct AdapterRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register an adapter. Registration order is the preference order used
    /// to break relevance-score ties during fan-out merge.
    pub fn register(&self, adapter: std::sync::Arc<dyn SourceAdapter>) {
        self.entries.write().unwrap().push(Entry {
            adapter,
            health: AdapterHealth::new(),
        });
    }

    /// Adapters in registration order, for the fan-out stage to invoke.
    pub fn adapters(&self) -> Vec<std::sync::Arc<dyn SourceAdapter>> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|e| e.adapter.clone())
            .collect()
    }

    /// Preference rank (0 = most preferred) of a tag, or `usize::MAX` if
    /// the tag is not registered.
    pub fn preference_rank(&self, tag: &str) -> usize {
        self.entries
            .read()
            .unwrap()
            .iter()
            .position(|e| e.adapter.tag() == tag)
            .unwrap_or(usize::MAX)
    }

    pub fn record_success(&self, tag: &str, latency_ms: u64) {
        if let Some(entry) = self
            .entries
            .write()
            .unwrap()
            .iter_mut()
            .find(|e| e.adapter.tag() == tag)
        {
            entry.health.record_success(latency_ms);
        }
    }

    pub fn record_failure(&self, tag: &str) {
        if let Some(entry) = self
            .entries
            .write()
            .unwrap()
            .iter_mut()
            .find(|e| e.adapter.tag() == tag)
        {
            entry.health.record_failure();
        }
    }

    pub fn health(&self, tag: &str) -> Option<AdapterHealth> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .find(|e| e.adapter.tag() == tag)
            .map(|e| e.health.clone())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::web::PublicWebAdapter;

    #[test]
    fn registration_order_is_preserved() {
        let registry = AdapterRegistry::new();
        registry.register(std::sync::Arc::new(PublicWebAdapter::new("fidelity", "https://fidelity.example")));
        registry.register(std::sync::Arc::new(PublicWebAdapter::new("mygps", "https://mygps.example")));

        assert_eq!(registry.preference_rank("fidelity"), 0);
        assert_eq!(registry.preference_rank("mygps"), 1);
        assert_eq!(registry.preference_rank("unknown"), usize::MAX);
    }

    #[test]
    fn health_tracks_success_rate() {
        let registry = AdapterRegistry::new();
        registry.register(std::sync::Arc::new(PublicWebAdapter::new("fidelity", "https://fidelity.example")));
        registry.record_success("fidelity", 100);
        registry.record_failure("fidelity");
        let health = registry.health("fidelity").unwrap();
        assert_eq!(health.success_rate(), 0.5);
    }
}
