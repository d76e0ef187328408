// =============================================================================
// In-memory Store backend
// =============================================================================
//
// A KV-with-pubsub-shaped backend that satisfies the same contract as the
// redis backend without requiring a running redis server. Used by
// `Store::fake()` for unit/integration tests and by `collector.provider =
// mock` for local development.
//
// All state lives behind `parking_lot::RwLock`s, the same primitive used
// throughout this codebase for shared mutable state.
// =============================================================================

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

#[derive(Default)]
pub struct MemoryBackend {
    strings: RwLock<HashMap<String, String>>,
    expiry: RwLock<HashMap<String, Instant>>,
    /// Sorted-set emulation: member -> score, kept for `ohlc_sorted:*`.
    sorted: RwLock<HashMap<String, Vec<(f64, String)>>>,
    sets: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_expired(&self, key: &str) -> bool {
        self.expiry.read().get(key).map(|at| Instant::now() >= *at).unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.is_expired(key) {
            return None;
        }
        self.strings.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: String) {
        self.strings.write().insert(key.to_string(), value);
        self.expiry.write().remove(key);
    }

    pub fn set_ex(&self, key: &str, value: String, ttl: std::time::Duration) {
        self.strings.write().insert(key.to_string(), value);
        self.expiry.write().insert(key.to_string(), Instant::now() + ttl);
    }

    pub fn del(&self, key: &str) {
        self.strings.write().remove(key);
        self.expiry.write().remove(key);
    }

    pub fn zadd(&self, key: &str, score: f64, member: String) {
        let mut sorted = self.sorted.write();
        let entries = sorted.entry(key.to_string()).or_default();
        entries.retain(|(_, m)| m != &member);
        entries.push((score, member));
        entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    }

    /// Most recent `limit` members, highest score first.
    pub fn zrevrange(&self, key: &str, limit: usize) -> Vec<String> {
        let sorted = self.sorted.read();
        let Some(entries) = sorted.get(key) else { return Vec::new() };
        entries.iter().rev().take(limit).map(|(_, m)| m.clone()).collect()
    }

    pub fn sadd(&self, key: &str, member: String) {
        let mut sets = self.sets.write();
        let members = sets.entry(key.to_string()).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
    }

    pub fn smembers(&self, key: &str) -> Vec<String> {
        self.sets.read().get(key).cloned().unwrap_or_default()
    }

    /// Read-modify-write guarded by the backend's own string lock, giving
    /// the same "per-signal mutex inside the Store" guarantee the redis
    /// backend provides via a Lua `EVAL` script.
    pub fn compare_and_set<F>(&self, key: &str, f: F) -> Option<(String, String)>
    where
        F: FnOnce(Option<&str>) -> Option<String>,
    {
        let mut strings = self.strings.write();
        let current = strings.get(key).cloned();
        let next = f(current.as_deref())?;
        strings.insert(key.to_string(), next.clone());
        Some((current.unwrap_or_default(), next))
    }
}
