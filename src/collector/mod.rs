// =============================================================================
// Collector — live and historical-replay market data ingestion
// =============================================================================
//
// Both variants share the same shape: constructed bound to a `Store`/`Bus`/
// `Arc<Clock>`, then `run(self, shutdown)` until cancelled. A shared
// `CollectorHandle` publishes health state (`healthy`/`degraded`/`unhealthy`)
// that the binary's health endpoint reads without needing to reach into the
// collector task itself.
// =============================================================================

pub mod live;
pub mod replay;

pub use live::LiveCollector;
pub use replay::ReplayCollector;

use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for CollectorHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectorHealth::Healthy => "healthy",
            CollectorHealth::Degraded => "degraded",
            CollectorHealth::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}

/// Cheap to clone, shared between a collector task and whatever reports
/// process health.
#[derive(Clone)]
pub struct CollectorHandle {
    state: Arc<RwLock<CollectorHealth>>,
}

impl Default for CollectorHandle {
    fn default() -> Self {
        Self { state: Arc::new(RwLock::new(CollectorHealth::Healthy)) }
    }
}

impl CollectorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, health: CollectorHealth) {
        *self.state.write() = health;
    }

    pub fn get(&self) -> CollectorHealth {
        *self.state.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_defaults_to_healthy_and_is_shared_across_clones() {
        let handle = CollectorHandle::new();
        let clone = handle.clone();
        assert_eq!(handle.get(), CollectorHealth::Healthy);
        clone.set(CollectorHealth::Degraded);
        assert_eq!(handle.get(), CollectorHealth::Degraded);
    }
}
