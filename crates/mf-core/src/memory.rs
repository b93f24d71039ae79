//! In-process sliding-window store.
//!
//! Each key holds a score-ordered `Vec` of samples. Samples almost always
//! arrive with a score at or after the newest one, so inserts are a push in
//! the common case and a binary-search insert otherwise. Used when no redis
//! is configured, and by the test suites.

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::ports::WindowStore;
use crate::types::WindowKey;

#[derive(Default)]
pub struct MemoryWindowStore {
    windows: Mutex<AHashMap<WindowKey, Vec<(i64, String)>>>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples currently held for `key`, regardless of score.
    pub fn len(&self, key: &WindowKey) -> usize {
        self.windows.lock().get(key).map_or(0, Vec::len)
    }

    /// Number of keys with at least one sample.
    pub fn key_count(&self) -> usize {
        self.windows.lock().len()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn add(&self, key: &WindowKey, score: i64, value: &str) -> Result<(), StoreError> {
        let mut windows = self.windows.lock();
        let samples = windows.entry(key.clone()).or_default();
        match samples.last() {
            Some(&(last, _)) if last > score => {
                let idx = samples.partition_point(|(s, _)| *s <= score);
                samples.insert(idx, (score, value.to_string()));
            }
            _ => samples.push((score, value.to_string())),
        }
        Ok(())
    }

    async fn range_by_score(&self, key: &WindowKey, min: i64, max: i64) -> Result<Vec<String>, StoreError> {
        let windows = self.windows.lock();
        let Some(samples) = windows.get(key) else {
            return Ok(Vec::new());
        };
        let start = samples.partition_point(|(s, _)| *s < min);
        Ok(samples[start..]
            .iter()
            .take_while(|(s, _)| *s <= max)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn remove_below(&self, key: &WindowKey, bound: i64) -> Result<u64, StoreError> {
        let mut windows = self.windows.lock();
        let Some(samples) = windows.get_mut(key) else {
            return Ok(0);
        };
        let cut = samples.partition_point(|(s, _)| *s < bound);
        samples.drain(..cut);
        if samples.is_empty() {
            windows.remove(key);
        }
        Ok(cut as u64)
    }
}
