//! Layered get-or-compute over the memory, session and local tiers

use crate::cache::{
    config::CacheConfig,
    dedup::QueryDeduplicator,
    local::LocalCache,
    memory::MemoryCache,
    session::SessionCache,
    types::{CacheStats, Tier},
};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::storage::{FileStore, InMemoryStore, KeyValueStore};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-call tier selection for `cached_query`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Also check and populate the session tier
    pub session_cache: bool,

    /// Also check and populate the local tier, with this TTL
    pub local_ttl: Option<Duration>,

    /// Memory-tier TTL; the configured default when `None`
    pub memory_ttl: Option<Duration>,
}

impl QueryOptions {
    /// Memory tier only, default TTL
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_cache(mut self) -> Self {
        self.session_cache = true;
        self
    }

    pub fn with_local_ttl(mut self, ttl: Duration) -> Self {
        self.local_ttl = Some(ttl);
        self
    }

    pub fn with_memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = Some(ttl);
        self
    }

    /// Whether a tier takes part in this call
    pub fn uses(&self, tier: Tier) -> bool {
        match tier {
            Tier::Memory => true,
            Tier::Session => self.session_cache,
            Tier::Local => self.local_ttl.is_some(),
        }
    }
}

/// The tiers a flight writes to, resolved from one caller's options
#[derive(Clone)]
struct Tiers {
    config: Arc<CacheConfig>,
    memory: Arc<MemoryCache>,
    session: Arc<SessionCache>,
    local: Arc<LocalCache>,
}

impl Tiers {
    fn memory_ttl(&self, options: &QueryOptions) -> Duration {
        self.config
            .ttl_with_jitter(options.memory_ttl.unwrap_or(self.config.default_memory_ttl))
    }

    /// Write a value into memory and every tier enabled by `options`
    fn fan_out(&self, key: &str, value: &Value, options: &QueryOptions, skip: Option<Tier>) {
        if skip != Some(Tier::Memory) {
            self.memory.set(key, value.clone(), self.memory_ttl(options));
        }
        if options.session_cache && skip != Some(Tier::Session) {
            self.session.set(key, value);
        }
        if let Some(ttl) = options.local_ttl {
            if skip != Some(Tier::Local) {
                self.local.set(key, value, self.config.ttl_with_jitter(ttl));
            }
        }
    }
}

/// Multi-tier cache with single-flight fetches
///
/// Cloning is cheap and every clone shares the same tiers. Build one at the
/// composition root and hand it to whatever needs cached queries.
#[derive(Clone)]
pub struct LayeredCache {
    tiers: Tiers,
    dedup: Arc<QueryDeduplicator<Value>>,
    fetch_failures: Arc<AtomicU64>,
}

impl LayeredCache {
    /// Create a cache from configuration using the system clock
    ///
    /// The session tier lives in memory for the lifetime of this value. The
    /// local tier uses `local_store_path` when set; if that file cannot be
    /// opened the local tier falls back to memory with a warning.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let local_store: Arc<dyn KeyValueStore> = match &config.local_store_path {
            Some(path) => match FileStore::open(path) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(
                        "Local store {:?} unavailable, using memory instead: {}",
                        path, e
                    );
                    Arc::new(InMemoryStore::new())
                }
            },
            None => Arc::new(InMemoryStore::new()),
        };

        Self::with_parts(
            config,
            Arc::new(InMemoryStore::new()),
            local_store,
            Arc::new(SystemClock),
        )
    }

    /// Create a cache over explicit backing stores and clock
    pub fn with_parts(
        config: CacheConfig,
        session_store: Arc<dyn KeyValueStore>,
        local_store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing layered cache (prefix: {}, memory ttl: {:?})",
            config.key_prefix, config.default_memory_ttl
        );

        let memory = MemoryCache::new(clock.clone()).with_max_entries(config.max_memory_entries);
        let session = SessionCache::new(session_store, format!("{}session:", config.key_prefix));
        let local = LocalCache::new(local_store, format!("{}local:", config.key_prefix), clock);

        Ok(Self {
            tiers: Tiers {
                config: Arc::new(config),
                memory: Arc::new(memory),
                session: Arc::new(session),
                local: Arc::new(local),
            },
            dedup: Arc::new(QueryDeduplicator::new()),
            fetch_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Return the cached value for `key`, or run `query_fn` once and cache it
    ///
    /// Tiers are checked memory, then session, then local; the first hit wins
    /// and back-fills the faster enabled tiers. On a full miss concurrent
    /// callers share one execution of `query_fn`. The flight writes memory
    /// before any waiter resumes, then every caller writes the session and
    /// local tiers its own `options` enable. Failures are returned to every
    /// waiter and never cached.
    pub async fn cached_query<T, F, Fut>(
        &self,
        key: &str,
        query_fn: F,
        options: QueryOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Some(value) = self.lookup::<T>(key, &options) {
            return Ok(value);
        }

        let tiers = self.tiers.clone();
        let owned_key = key.to_string();
        let flight_options = options.clone();
        let flight = self.dedup.dedupe(key, move || async move {
            // Another flight may have filled memory since our lookup
            if let Some(value) = tiers.memory.peek(&owned_key) {
                if serde_json::from_value::<T>(value.clone()).is_ok() {
                    return Ok(value);
                }
            }

            let fetched = query_fn().await?;
            let value = serde_json::to_value(fetched).map_err(|source| Unserializable {
                key: owned_key.clone(),
                source,
            })?;

            tiers
                .memory
                .set(&owned_key, value.clone(), tiers.memory_ttl(&flight_options));
            debug!("Cached fresh result: {}", owned_key);
            Ok(value)
        });

        let value = match flight.await {
            Ok(value) => value,
            Err(e) => {
                if let Some(unserializable) = e.downcast_ref::<Unserializable>() {
                    return Err(CacheError::Serialization(unserializable.to_string()));
                }
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Query failed for {}: {}", key, e);
                return Err(CacheError::Fetch(e));
            }
        };

        let typed = serde_json::from_value(value.clone()).map_err(|e| {
            CacheError::Serialization(format!("cached value for {} has wrong shape: {}", key, e))
        })?;
        self.tiers.fan_out(key, &value, &options, Some(Tier::Memory));
        Ok(typed)
    }

    /// Tier lookup in priority order, back-filling on session/local hits
    fn lookup<T: DeserializeOwned>(&self, key: &str, options: &QueryOptions) -> Option<T> {
        let tiers = &self.tiers;

        if let Some(value) = tiers.memory.get(key) {
            if let Some(typed) = decode(key, Tier::Memory, value) {
                return Some(typed);
            }
        }

        if options.session_cache {
            if let Some(value) = tiers.session.get(key) {
                if let Some(typed) = decode(key, Tier::Session, value.clone()) {
                    tiers.memory.set(key, value, tiers.memory_ttl(options));
                    return Some(typed);
                }
            }
        }

        if options.local_ttl.is_some() {
            if let Some(value) = tiers.local.get(key) {
                if let Some(typed) = decode(key, Tier::Local, value.clone()) {
                    tiers.fan_out(key, &value, options, Some(Tier::Local));
                    return Some(typed);
                }
            }
        }

        None
    }

    /// Remove `key` from every tier
    pub fn invalidate(&self, key: &str) {
        self.tiers.memory.remove(key);
        self.tiers.session.remove(key);
        self.tiers.local.remove(key);
        debug!("Invalidated {}", key);
    }

    /// Remove every key starting with `prefix` from every tier
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = self.tiers.memory.remove_prefix(prefix)
            + self.tiers.session.remove_prefix(prefix)
            + self.tiers.local.remove_prefix(prefix);
        info!("Invalidated {} entries with prefix: {}", removed, prefix);
        removed
    }

    /// Clear every tier and forget in-flight queries
    pub fn clear_all(&self) {
        self.tiers.memory.clear();
        self.tiers.session.clear();
        self.tiers.local.clear();
        self.dedup.clear();
        info!("Cleared all cache tiers");
    }

    /// Proactively drop expired memory and local entries
    pub fn purge_expired(&self) -> usize {
        self.tiers.memory.purge_expired() + self.tiers.local.purge_expired()
    }

    /// Start the background sweep if the configuration enables it
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_auto_cleanup(&self) -> Option<JoinHandle<()>> {
        if !self.tiers.config.enable_auto_cleanup {
            return None;
        }
        Some(tokio::spawn(start_auto_cleanup(
            self.clone(),
            self.tiers.config.cleanup_interval,
        )))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory: self.tiers.memory.stats(),
            session: self.tiers.session.stats(),
            local: self.tiers.local.stats(),
            fetches: self.dedup.started(),
            joined: self.dedup.joined(),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.tiers.memory
    }

    pub fn session(&self) -> &SessionCache {
        &self.tiers.session
    }

    pub fn local(&self) -> &LocalCache {
        &self.tiers.local
    }

    pub fn deduplicator(&self) -> &QueryDeduplicator<Value> {
        &self.dedup
    }

    pub fn config(&self) -> &CacheConfig {
        &self.tiers.config
    }
}

/// A query result that has no JSON representation
#[derive(Debug, Error)]
#[error("query result for {key} is not serializable: {source}")]
struct Unserializable {
    key: String,
    source: serde_json::Error,
}

fn decode<T: DeserializeOwned>(key: &str, tier: Tier, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(typed) => Some(typed),
        Err(e) => {
            warn!("Ignoring {} entry {} of unexpected shape: {}", tier, key, e);
            None
        }
    }
}

/// Background task for periodic expiry sweeps
pub async fn start_auto_cleanup(cache: LayeredCache, interval: Duration) {
    info!("Starting automatic cache cleanup task (interval: {:?})", interval);

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let purged = cache.purge_expired();
        if purged > 0 {
            debug!("Auto cleanup purged {} expired entries", purged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn cache() -> (LayeredCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = LayeredCache::with_parts(
            CacheConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            clock.clone(),
        )
        .unwrap();
        (cache, clock)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: u32,
        likes: u32,
    }

    #[test]
    fn test_query_options() {
        let options = QueryOptions::new();
        assert!(options.uses(Tier::Memory));
        assert!(!options.uses(Tier::Session));
        assert!(!options.uses(Tier::Local));

        let options = QueryOptions::new()
            .with_session_cache()
            .with_local_ttl(Duration::from_secs(10))
            .with_memory_ttl(Duration::from_secs(1));
        assert!(options.uses(Tier::Session));
        assert!(options.uses(Tier::Local));
        assert_eq!(options.memory_ttl, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_typed_round_trip_through_memory() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = calls.clone();
            let post: Post = cache
                .cached_query(
                    "post:1",
                    move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Post { id: 1, likes: 3 })
                    },
                    QueryOptions::new(),
                )
                .await
                .unwrap();
            assert_eq!(post, Post { id: 1, likes: 3 });
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.memory().get("post:1"), Some(json!({"id": 1, "likes": 3})));
    }

    #[tokio::test]
    async fn test_memory_ttl_option_and_default() {
        let (cache, clock) = cache();

        cache
            .cached_query(
                "short",
                || async { Ok(1u8) },
                QueryOptions::new().with_memory_ttl(Duration::from_millis(100)),
            )
            .await
            .unwrap();
        cache
            .cached_query("default", || async { Ok(2u8) }, QueryOptions::new())
            .await
            .unwrap();

        assert_eq!(cache.memory().entry("short").unwrap().ttl_ms, 100);
        assert_eq!(cache.memory().entry("default").unwrap().ttl_ms, 300_000);

        clock.set(100);
        assert_eq!(cache.memory().get("short"), None);
        assert!(cache.memory().get("default").is_some());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_miss() {
        let (cache, _) = cache();
        cache
            .memory()
            .set("post:2", json!("not a post"), Duration::from_secs(60));

        let post: Post = cache
            .cached_query("post:2", || async { Ok(Post { id: 2, likes: 0 }) }, QueryOptions::new())
            .await
            .unwrap();

        assert_eq!(post.id, 2);
        assert_eq!(cache.memory().get("post:2"), Some(json!({"id": 2, "likes": 0})));
    }

    #[tokio::test]
    async fn test_local_hit_backfills_faster_tiers() {
        let (cache, _) = cache();
        cache.local().set("feed", &json!([1, 2, 3]), Duration::from_secs(60));

        let options = QueryOptions::new()
            .with_session_cache()
            .with_local_ttl(Duration::from_secs(60));
        let feed: Vec<u32> = cache
            .cached_query("feed", || async { Err(anyhow::anyhow!("must not be called")) }, options)
            .await
            .unwrap();

        assert_eq!(feed, vec![1, 2, 3]);
        assert_eq!(cache.memory().get("feed"), Some(json!([1, 2, 3])));
        assert_eq!(cache.session().get("feed"), Some(json!([1, 2, 3])));
        assert_eq!(cache.stats().fetches, 0);
    }

    #[tokio::test]
    async fn test_invalidate_prefix_spans_tiers() {
        let (cache, _) = cache();
        let options = QueryOptions::new()
            .with_session_cache()
            .with_local_ttl(Duration::from_secs(60));

        for page in 1..=2u32 {
            let key = format!("feed?page={}", page);
            cache
                .cached_query(&key, move || async move { Ok(page) }, options.clone())
                .await
                .unwrap();
        }
        let _: String = cache
            .cached_query("profile:u1", || async { Ok("u1".to_string()) }, options.clone())
            .await
            .unwrap();

        assert_eq!(cache.invalidate_prefix("feed"), 6);
        assert!(cache.memory().get("feed?page=1").is_none());
        assert!(cache.local().get("feed?page=2").is_none());
        assert!(cache.memory().get("profile:u1").is_some());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_failures() {
        let (cache, _) = cache();

        cache
            .cached_query("k", || async { Ok(1u32) }, QueryOptions::new())
            .await
            .unwrap();
        cache
            .cached_query("k", || async { Ok(1u32) }, QueryOptions::new())
            .await
            .unwrap();
        let _ = cache
            .cached_query::<u32, _, _>("bad", || async { Err(anyhow::anyhow!("offline")) }, QueryOptions::new())
            .await;

        let stats = cache.stats();
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.fetch_failures, 1);
        assert_eq!(stats.memory.hits, 1);
        assert!((stats.hit_rate() - 33.33).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_unserializable_result_is_a_serialization_error() {
        let (cache, _) = cache();

        let result = cache
            .cached_query(
                "pairs",
                || async {
                    let mut pairs = std::collections::HashMap::new();
                    pairs.insert((1u8, 2u8), 3u8);
                    Ok(pairs)
                },
                QueryOptions::new(),
            )
            .await;

        match result {
            Err(CacheError::Serialization(message)) => {
                assert!(message.contains("pairs is not serializable"));
            }
            other => panic!("expected a serialization error, got {:?}", other),
        }
        assert_eq!(cache.stats().fetch_failures, 0);
        assert!(cache.memory().is_empty());
    }

    #[tokio::test]
    async fn test_full_miss_counts_one_memory_miss() {
        let (cache, _) = cache();
        cache
            .cached_query("k", || async { Ok(1u8) }, QueryOptions::new())
            .await
            .unwrap();

        assert_eq!(cache.memory().stats().misses, 1);
    }

    #[tokio::test]
    async fn test_auto_cleanup_disabled_by_default() {
        let (cache, _) = cache();
        assert!(cache.spawn_auto_cleanup().is_none());
    }
}
