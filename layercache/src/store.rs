//! Opening the local tier the way `LayeredCache` lays it out on disk

use anyhow::{Context, Result};
use layercache_core::{FileStore, LocalCache, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default store location: `<user cache dir>/layercache/local.json`
pub fn default_store_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("layercache")
        .join("local.json")
}

/// Open the local tier stored at `path` under `prefix`
pub fn open_local(path: &Path, prefix: &str) -> Result<LocalCache> {
    let store = FileStore::open(path)
        .with_context(|| format!("Failed to open local store at {:?}", path))?;

    Ok(LocalCache::new(
        Arc::new(store),
        format!("{}local:", prefix),
        Arc::new(SystemClock),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_store_path() {
        let path = default_store_path();
        assert!(path.ends_with("layercache/local.json"));
    }

    #[test]
    fn test_open_local_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local.json");

        let local = open_local(&path, "app:").unwrap();
        local.set("feed", &json!([1, 2]), Duration::from_secs(60));
        drop(local);

        let reopened = open_local(&path, "app:").unwrap();
        assert_eq!(reopened.get("feed"), Some(json!([1, 2])));
        assert_eq!(reopened.namespace(), "app:local:");

        let other = open_local(&path, "other:").unwrap();
        assert!(other.is_empty());
    }
}
