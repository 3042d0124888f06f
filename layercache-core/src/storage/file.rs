//! Durable JSON file store
//!
//! The whole map is held in memory and written back on every mutation. Each
//! write goes to a uniquely named temporary file next to the target and is
//! then renamed over it, so a crash mid-write leaves the previous contents
//! intact.

use super::{entry_size, KeyValueStore};
use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Key-value store persisted to a single JSON file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// A missing file is an empty store. A file that is not a JSON string map
    /// is logged and treated as empty; it is overwritten on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring corrupt store file {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Opened file store {:?} with {} keys", path, values.len());

        Ok(Self {
            path,
            values: Mutex::new(values),
            quota_bytes: None,
        })
    }

    /// Reject writes that would grow the stored data beyond `quota_bytes`
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let content = serde_json::to_string(values)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&tmp, content)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply a mutation under one lock, persist it, and roll back on failure
    ///
    /// `apply` may reject the mutation; nothing is written in that case.
    fn mutate<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Result<(), StorageError>,
    {
        let mut values = self.values.lock();
        let snapshot = values.clone();

        if let Err(e) = apply(&mut values).and_then(|()| self.persist(&values)) {
            *values = snapshot;
            return Err(e);
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let quota = self.quota_bytes;
        self.mutate(|values| {
            if let Some(limit) = quota {
                let used: usize = values
                    .iter()
                    .filter(|(k, _)| k.as_str() != key)
                    .map(|(k, v)| entry_size(k, v))
                    .sum();
                let requested = used + entry_size(key, value);
                if requested > limit {
                    return Err(StorageError::QuotaExceeded { limit, requested });
                }
            }
            values.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key.to_string()])
    }

    /// One file rewrite for the whole batch
    fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        {
            let values = self.values.lock();
            if !keys.iter().any(|k| values.contains_key(k)) {
                return Ok(());
            }
        }
        self.mutate(|values| {
            for key in keys {
                values.remove(key);
            }
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.values.lock().keys().cloned().collect())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.mutate(|values| {
            values.clear();
            Ok(())
        })
    }
}
