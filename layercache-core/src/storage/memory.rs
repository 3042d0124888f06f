//! In-process key-value store

use super::{entry_size, KeyValueStore};
use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Volatile store backed by a `HashMap`
///
/// Its lifetime is the lifetime of the value, which makes it the default
/// backing for the session tier. An optional byte quota emulates storage
/// that fills up.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    quota_bytes: Option<usize>,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    used_bytes: usize,
}

impl InMemoryStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes beyond `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently charged against the quota
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.lock().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();

        let previous = inner
            .values
            .get(key)
            .map(|old| entry_size(key, old))
            .unwrap_or(0);
        let requested = inner.used_bytes - previous + entry_size(key, value);

        if let Some(limit) = self.quota_bytes {
            if requested > limit {
                return Err(StorageError::QuotaExceeded { limit, requested });
            }
        }

        inner.values.insert(key.to_string(), value.to_string());
        inner.used_bytes = requested;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.values.remove(key) {
            inner.used_bytes = inner.used_bytes.saturating_sub(entry_size(key, &old));
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.inner.lock().values.keys().cloned().collect())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.values.clear();
        inner.used_bytes = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = InMemoryStore::new();

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));

        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("2".to_string()));
        assert_eq!(store.keys().unwrap(), vec!["a".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        // Idempotent
        store.remove("a").unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn test_quota_exceeded() {
        let store = InMemoryStore::with_quota(10);

        store.set("k1", "12345").unwrap();
        assert_eq!(store.used_bytes(), 7);

        let err = store.set("k2", "12345").unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded { limit: 10, requested: 14 }
        ));
        assert_eq!(store.get("k2").unwrap(), None);

        // Overwriting reuses the space of the old value
        store.set("k1", "1234567").unwrap();
        assert_eq!(store.used_bytes(), 9);
    }

    #[test]
    fn test_clear_resets_usage() {
        let store = InMemoryStore::with_quota(100);
        store.set("k1", "value").unwrap();
        store.set("k2", "value").unwrap();

        store.clear().unwrap();

        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.used_bytes(), 0);
    }
}
