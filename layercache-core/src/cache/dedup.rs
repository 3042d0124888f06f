//! Single-flight deduplication of concurrent queries
//!
//! `dedupe` registers the in-flight query before returning, so any caller
//! arriving before it settles joins the same `Shared` future instead of
//! starting its own. The registration is removed by a drop guard inside the
//! query future itself: it disappears on success, failure, panic, or drop,
//! before any waiter observes the outcome.

use crate::cache::types::CacheKey;
use crate::error::SharedError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Shared handle to one in-flight query
pub type InFlight<V> = Shared<BoxFuture<'static, Result<V, SharedError>>>;

type Registry<V> = Arc<Mutex<HashMap<CacheKey, Registration<V>>>>;

struct Registration<V> {
    generation: u64,
    flight: InFlight<V>,
}

/// Collapses concurrent queries for the same key into one execution
pub struct QueryDeduplicator<V> {
    registry: Registry<V>,
    next_generation: AtomicU64,
    started: AtomicU64,
    joined: AtomicU64,
}

impl<V> Default for QueryDeduplicator<V> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            started: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }
}

impl<V> QueryDeduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight query for `key`, or start `query_fn` as a new one
    ///
    /// Registration happens synchronously, before this returns. Inside a
    /// Tokio runtime the query is spawned and runs to completion even if every
    /// waiter is dropped; outside one it is driven by whoever polls it.
    /// `query_fn` is invoked at most once per flight and never while the
    /// registry lock is held.
    pub fn dedupe<F, Fut>(&self, key: &str, query_fn: F) -> InFlight<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let mut registry = self.registry.lock();

        if let Some(existing) = registry.get(key) {
            self.joined.fetch_add(1, Ordering::Relaxed);
            debug!("Joining in-flight query: {}", key);
            return existing.flight.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let guard = Unregister {
            registry: Arc::clone(&self.registry),
            key: key.to_string(),
            generation,
        };

        let work = async move {
            let _guard = guard;
            query_fn().await.map_err(Arc::new)
        };

        let flight = match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(work);
                async move {
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(Arc::new(anyhow::anyhow!("query task failed: {}", e))),
                    }
                }
                .boxed()
                .shared()
            }
            Err(_) => work.boxed().shared(),
        };

        registry.insert(
            key.to_string(),
            Registration {
                generation,
                flight: flight.clone(),
            },
        );
        self.started.fetch_add(1, Ordering::Relaxed);
        debug!("Started query: {}", key);

        flight
    }

    /// Forget every registration without cancelling running work
    ///
    /// Callers already holding an `InFlight` still get its outcome; the next
    /// `dedupe` for any key starts fresh.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.registry.lock());
        if !drained.is_empty() {
            debug!("Dropped {} in-flight registrations", drained.len());
        }
        // Dropped outside the lock: a last handle may run the flight's guard
        drop(drained);
    }

    /// Number of registered in-flight queries
    pub fn in_flight(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.registry.lock().contains_key(key)
    }

    /// Number of times a query function was started
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Number of callers that joined an existing flight
    pub fn joined(&self) -> u64 {
        self.joined.load(Ordering::Relaxed)
    }
}

/// Removes a flight's registration when the flight settles or is dropped
struct Unregister<V> {
    registry: Registry<V>,
    key: CacheKey,
    generation: u64,
}

impl<V> Drop for Unregister<V> {
    fn drop(&mut self) {
        let removed = {
            let mut registry = self.registry.lock();
            match registry.get(&self.key) {
                Some(current) if current.generation == self.generation => {
                    registry.remove(&self.key)
                }
                // Cleared, or superseded by a newer flight
                _ => None,
            }
        };
        drop(removed);
    }
}
