//! Registry of window keys the aggregator walks each tick.
//!
//! The collector registers a key on every stored quote, recording the score
//! it wrote. The aggregator snapshots the key set per tick and may evict a
//! key once its window has been empty long enough. Eviction re-checks the
//! last written score under the write lock, so a key that just received a
//! quote is never dropped.

use ahash::AHashMap;
use mf_core::WindowKey;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: RwLock<AHashMap<WindowKey, i64>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a sample was written under `key` at `score`.
    /// Returns `true` when the key was not known before.
    pub fn register(&self, key: &WindowKey, score: i64) -> bool {
        let mut keys = self.keys.write();
        match keys.get_mut(key) {
            Some(last) => {
                *last = (*last).max(score);
                false
            }
            None => {
                keys.insert(key.clone(), score);
                true
            }
        }
    }

    /// Point-in-time copy of the key set, sorted.
    pub fn snapshot(&self) -> Vec<WindowKey> {
        let mut keys: Vec<_> = self.keys.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove `key` if nothing was written to it at or after `cutoff`.
    pub fn evict_if_idle(&self, key: &WindowKey, cutoff: i64) -> bool {
        let mut keys = self.keys.write();
        match keys.get(key) {
            Some(&last) if last < cutoff => {
                keys.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn last_written(&self, key: &WindowKey) -> Option<i64> {
        self.keys.read().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let reg = KeyRegistry::new();
        let k = WindowKey::new("ex1", "BTCUSD");
        assert!(reg.register(&k, 100));
        assert!(!reg.register(&k, 90));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.last_written(&k), Some(100));
    }

    #[test]
    fn snapshot_sorted() {
        let reg = KeyRegistry::new();
        reg.register(&WindowKey::new("ex2", "A"), 1);
        reg.register(&WindowKey::new("ex1", "B"), 1);
        let snap: Vec<_> = reg.snapshot().iter().map(|k| k.to_string()).collect();
        assert_eq!(snap, vec!["ex1:B", "ex2:A"]);
    }

    #[test]
    fn eviction_respects_recent_writes() {
        let reg = KeyRegistry::new();
        let k = WindowKey::new("ex1", "BTCUSD");
        reg.register(&k, 1_000);
        assert!(!reg.evict_if_idle(&k, 1_000));
        assert!(reg.evict_if_idle(&k, 1_001));
        assert!(reg.is_empty());
        assert!(!reg.evict_if_idle(&k, 5_000));
    }
}
