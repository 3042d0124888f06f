//! Durable local tier with TTL checked at read time

use crate::cache::{
    entry::CacheEntry,
    types::{CacheKey, TierCounters, TierStats},
};
use crate::clock::Clock;
use crate::storage::KeyValueStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cross-restart tier storing `CacheEntry` JSON in a persistent store
///
/// Storage failures never leave this type: reads degrade to misses and
/// writes to no-ops, each logged and counted.
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    clock: Arc<dyn Clock>,
    counters: TierCounters,
}

impl LocalCache {
    /// Create a tier writing `{namespace}{key}` into `store`
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        namespace: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            clock,
            counters: TierCounters::default(),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Read and decode an entry without judging freshness
    fn load(&self, key: &str) -> Option<CacheEntry<Value>> {
        let storage_key = self.storage_key(key);

        let raw = match self.store.get(&storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Local cache read failed for {}: {}", key, e);
                self.counters.error();
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Discarding malformed local entry {}: {}", key, e);
                self.discard(&storage_key, key);
                None
            }
        }
    }

    /// Get a fresh value; expired entries are removed and reported as a miss
    pub fn get(&self, key: &str) -> Option<Value> {
        let Some(entry) = self.load(key) else {
            self.counters.miss();
            return None;
        };

        if entry.is_fresh(self.clock.now_millis()) {
            debug!("Local hit: {}", key);
            self.counters.hit();
            Some(entry.value)
        } else {
            debug!("Local entry expired: {}", key);
            self.discard(&self.storage_key(key), key);
            self.counters.expired(1);
            self.counters.miss();
            None
        }
    }

    /// The decoded entry, fresh or not
    pub fn entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        self.load(key)
    }

    /// Store a value stamped with the current time and `ttl`
    pub fn set(&self, key: &str, value: &Value, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now_millis(), ttl);

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Local cache could not encode {}: {}", key, e);
                self.counters.error();
                return;
            }
        };

        match self.store.set(&self.storage_key(key), &raw) {
            Ok(()) => self.counters.write(),
            Err(e) => {
                warn!("Local cache write failed for {}: {}", key, e);
                self.counters.error();
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(&self.storage_key(key)) {
            warn!("Local cache remove failed for {}: {}", key, e);
            self.counters.error();
        }
    }

    /// Tier keys (without namespace) currently stored
    pub fn keys(&self) -> Vec<CacheKey> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&self.namespace).map(str::to_string))
                .collect(),
            Err(e) => {
                warn!("Local cache key listing failed: {}", e);
                self.counters.error();
                Vec::new()
            }
        }
    }

    /// Every decodable entry, including expired ones, sorted by key
    pub fn entries(&self) -> Vec<(CacheKey, CacheEntry<Value>)> {
        let mut entries: Vec<_> = self
            .keys()
            .into_iter()
            .filter_map(|key| self.load(&key).map(|entry| (key, entry)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Remove every tier key starting with `prefix`
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let doomed: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .map(|k| self.storage_key(&k))
            .collect();
        self.remove_batch(&doomed, prefix)
    }

    fn remove_batch(&self, storage_keys: &[String], label: &str) -> usize {
        if storage_keys.is_empty() {
            return 0;
        }
        match self.store.remove_many(storage_keys) {
            Ok(()) => storage_keys.len(),
            Err(e) => {
                warn!("Local cache remove failed for {}: {}", label, e);
                self.counters.error();
                0
            }
        }
    }

    fn discard(&self, storage_key: &str, key: &str) {
        if let Err(e) = self.store.remove(storage_key) {
            warn!("Local cache could not discard {}: {}", key, e);
            self.counters.error();
        }
    }

    /// Remove this tier's keys, leaving foreign keys in the store alone
    pub fn clear(&self) {
        let removed = self.remove_prefix("");
        debug!("Cleared {} local entries", removed);
    }

    /// Remove expired entries; undecodable ones are discarded on the way
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let stale: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|key| matches!(self.load(key), Some(entry) if entry.is_expired(now)))
            .map(|key| self.storage_key(&key))
            .collect();

        let purged = self.remove_batch(&stale, "expired entries");
        self.counters.expired(purged as u64);
        purged
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn stats(&self) -> TierStats {
        self.counters.snapshot()
    }
}
