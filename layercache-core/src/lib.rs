//! # layercache-core
//!
//! Client-side layered caching with query deduplication.
//!
//! ## Features
//!
//! - Memory, session and local tiers checked in a fixed priority order
//! - TTL recorded at write time and checked on read
//! - Single-flight fetches: concurrent identical queries run once
//! - Failures are shared by all waiters and never cached
//! - Storage problems (full, disabled, corrupt) degrade to cache misses
//! - Pluggable backing stores via [`storage::KeyValueStore`]
//! - Injectable [`clock::Clock`] for deterministic expiry tests
//!
//! ## Quick start
//!
//! ```no_run
//! use layercache_core::{CacheConfig, LayeredCache, QueryOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::builder()
//!         .local_store_path("/var/tmp/app/local-cache.json")
//!         .default_memory_ttl(Duration::from_secs(60))
//!         .build();
//!     let cache = LayeredCache::new(config)?;
//!
//!     let likes: u64 = cache
//!         .cached_query(
//!             "likes:post-42",
//!             || async { Ok(17) },
//!             QueryOptions::new().with_local_ttl(Duration::from_secs(3600)),
//!         )
//!         .await?;
//!     println!("likes: {}", likes);
//!
//!     // On logout
//!     cache.clear_all();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod error;
pub mod storage;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheKeyBuilder, CacheStats,
    LayeredCache, LocalCache, MemoryCache, QueryDeduplicator, QueryOptions, SessionCache, Tier,
    TierStats,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result, SharedError, StorageError};
pub use storage::{FileStore, InMemoryStore, KeyValueStore};
