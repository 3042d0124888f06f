//! # Layered Caching
//!
//! Three cache tiers behind one get-or-compute call, plus single-flight
//! deduplication of the underlying fetches.
//!
//! ## Tiers
//!
//! - **Memory**: in-process map, checked first, lost on restart
//! - **Session**: no TTL, lives as long as its backing store
//! - **Local**: durable backing store, TTL checked on every read
//!
//! Every TTL is recorded with the entry when it is written. Expired entries
//! are dropped lazily on read; `LayeredCache::purge_expired` and the
//! optional background sweep only reclaim space.
//!
//! ## Example
//!
//! ```rust
//! use layercache_core::cache::{CacheConfig, LayeredCache, QueryOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = LayeredCache::new(CacheConfig::default())?;
//!
//! let options = QueryOptions::new()
//!     .with_session_cache()
//!     .with_local_ttl(Duration::from_secs(600));
//!
//! // Concurrent callers with the same key share one fetch
//! let feed: Vec<String> = cache
//!     .cached_query("feed?page=1", || async { Ok(vec!["post-1".to_string()]) }, options)
//!     .await?;
//!
//! cache.invalidate("feed?page=1");
//! # let _ = feed;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dedup;
pub mod entry;
pub mod keys;
pub mod layered;
pub mod local;
pub mod memory;
pub mod session;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use dedup::{InFlight, QueryDeduplicator};
pub use entry::CacheEntry;
pub use keys::{canonical_json, CacheKeyBuilder};
pub use layered::{start_auto_cleanup, LayeredCache, QueryOptions};
pub use local::LocalCache;
pub use memory::MemoryCache;
pub use session::SessionCache;
pub use types::{CacheKey, CacheStats, Tier, TierStats};
