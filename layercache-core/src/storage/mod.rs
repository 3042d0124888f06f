//! Backing key-value stores for the session and local tiers
//!
//! Tiers never talk to a concrete storage medium. They hold an
//! `Arc<dyn KeyValueStore>` and namespace their keys with a prefix, so one
//! store can be shared with unrelated application data.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::InMemoryStore;

use crate::error::StorageError;

/// Capability interface over a string key-value store
///
/// Every operation may fail; callers in this crate treat failures as a
/// cache miss or a skipped write.
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a raw value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Delete several values; stores backed by a single file override this
    /// to rewrite it once
    fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }

    /// List every key currently stored
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Delete everything in the store, including keys owned by others
    fn clear(&self) -> Result<(), StorageError>;
}

/// Bytes charged against a store quota for one key-value pair
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}
