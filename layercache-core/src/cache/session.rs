//! Session-scoped tier

use crate::cache::types::{TierCounters, TierStats};
use crate::storage::KeyValueStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tier without TTL: presence is the only validity signal
///
/// The backing store is expected to disappear when the session ends. All
/// keys are namespaced so the tier only ever touches its own data.
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    counters: TierCounters,
}

impl SessionCache {
    /// Create a tier writing `{namespace}{key}` into `store`
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            counters: TierCounters::default(),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Get a value; unreadable or corrupt data is a miss
    pub fn get(&self, key: &str) -> Option<Value> {
        let storage_key = self.storage_key(key);

        let raw = match self.store.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.miss();
                return None;
            }
            Err(e) => {
                warn!("Session cache read failed for {}: {}", key, e);
                self.counters.error();
                self.counters.miss();
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!("Session hit: {}", key);
                self.counters.hit();
                Some(value)
            }
            Err(e) => {
                warn!("Discarding malformed session entry {}: {}", key, e);
                self.discard(&storage_key, key);
                self.counters.miss();
                None
            }
        }
    }

    /// Store a value; a failing store turns this into a no-op
    pub fn set(&self, key: &str, value: &Value) {
        match self.store.set(&self.storage_key(key), &value.to_string()) {
            Ok(()) => self.counters.write(),
            Err(e) => {
                warn!("Session cache write failed for {}: {}", key, e);
                self.counters.error();
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(&self.storage_key(key)) {
            warn!("Session cache remove failed for {}: {}", key, e);
            self.counters.error();
        }
    }

    /// Remove every tier key starting with `prefix`
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let full_prefix = self.storage_key(prefix);
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Session cache key listing failed: {}", e);
                self.counters.error();
                return 0;
            }
        };

        let doomed: Vec<String> = keys
            .into_iter()
            .filter(|k| k.starts_with(&full_prefix))
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        match self.store.remove_many(&doomed) {
            Ok(()) => doomed.len(),
            Err(e) => {
                warn!("Session cache remove failed for prefix {}: {}", prefix, e);
                self.counters.error();
                0
            }
        }
    }

    fn discard(&self, storage_key: &str, key: &str) {
        if let Err(e) = self.store.remove(storage_key) {
            warn!("Session cache could not discard {}: {}", key, e);
            self.counters.error();
        }
    }

    /// Remove this tier's keys, leaving foreign keys in the store alone
    pub fn clear(&self) {
        let removed = self.remove_prefix("");
        debug!("Cleared {} session entries", removed);
    }

    /// Number of keys this tier owns in the store
    pub fn len(&self) -> usize {
        self.store
            .keys()
            .map(|keys| keys.iter().filter(|k| k.starts_with(&self.namespace)).count())
            .unwrap_or(0)
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
