//! Cache entry with write-time TTL

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A stored value with the moment it was written and how long it stays fresh
///
/// The TTL travels with the entry, so readers cannot disagree with the
/// writer about freshness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,

    /// Write time in milliseconds
    pub timestamp: i64,

    /// Time-to-live in milliseconds
    #[serde(rename = "ttl")]
    pub ttl_ms: u64,
}

impl<V> CacheEntry<V> {
    /// Create an entry written at `now`
    pub fn new(value: V, now: i64, ttl: Duration) -> Self {
        Self {
            value,
            timestamp: now,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Fresh iff `now - timestamp < ttl`
    pub fn is_fresh(&self, now: i64) -> bool {
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        now.saturating_sub(self.timestamp) < ttl
    }

    pub fn is_expired(&self, now: i64) -> bool {
        !self.is_fresh(now)
    }

    /// Time the entry stops being fresh
    pub fn expires_at(&self) -> i64 {
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        self.timestamp.saturating_add(ttl)
    }

    /// Age of the entry (zero if written in the future)
    pub fn age(&self, now: i64) -> Duration {
        let millis = now.saturating_sub(self.timestamp).max(0);
        Duration::from_millis(millis as u64)
    }

    /// Remaining freshness, or `None` once expired
    pub fn time_until_expiration(&self, now: i64) -> Option<Duration> {
        let left = self.expires_at().saturating_sub(now);
        if left > 0 {
            Some(Duration::from_millis(left as u64))
        } else {
            None
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}
