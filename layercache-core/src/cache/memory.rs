//! In-process memory tier

use crate::cache::{
    entry::CacheEntry,
    types::{CacheKey, TierCounters, TierStats},
};
use crate::clock::Clock;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fastest tier: a `HashMap` of TTL-stamped values
///
/// Entries expire lazily when read. An optional entry bound evicts expired
/// entries first and then the oldest write.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry<Value>>>,
    clock: Arc<dyn Clock>,
    max_entries: Option<usize>,
    counters: TierCounters,
}

impl MemoryCache {
    /// Create an unbounded memory tier
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            max_entries: None,
            counters: TierCounters::default(),
        }
    }

    /// Bound the number of entries
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Get a fresh value; an expired entry is evicted and reported as a miss
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_millis();

        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_fresh(now) => {
                    self.counters.hit();
                    debug!("Memory hit: {}", key);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.counters.miss();
                    return None;
                }
            }
        }

        // Re-check under the write lock; a concurrent write may have refreshed it
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                self.counters.hit();
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.counters.expired(1);
                self.counters.miss();
                debug!("Memory entry expired: {}", key);
                None
            }
            None => {
                self.counters.miss();
                None
            }
        }
    }

    /// Store a value, replacing any previous entry
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now_millis(), ttl);
        let mut entries = self.entries.write();

        if let Some(max) = self.max_entries {
            if !entries.contains_key(key) && entries.len() >= max {
                self.make_room(&mut entries, max);
            }
        }

        entries.insert(key.to_string(), entry);
        self.counters.write();
    }

    /// A fresh value without counting a hit or miss or evicting anything
    pub fn peek(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_millis();
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    /// The raw entry, fresh or not
    pub fn entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        self.entries.read().get(key).cloned()
    }

    /// Remove an entry; missing keys are fine
    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Remove every key starting with `prefix`, returning how many went
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    /// Remove everything
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        let purged = before - entries.len();
        self.counters.expired(purged as u64);
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> TierStats {
        self.counters.snapshot()
    }

    fn make_room(&self, entries: &mut HashMap<CacheKey, CacheEntry<Value>>, max: usize) {
        let now = self.clock.now_millis();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        self.counters.expired((before - entries.len()) as u64);

        while entries.len() >= max {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.timestamp)
                .map(|(key, _)| key.clone());

            match oldest {
                Some(key) => {
                    debug!("Evicting memory entry due to max_entries limit: {}", key);
                    entries.remove(&key);
                    self.counters.evicted();
                }
                None => break,
            }
        }
    }
}
