//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache key type - opaque, must be built deterministically
pub type CacheKey = String;

/// Cache tier in lookup priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// In-process, fastest, lost on restart
    Memory,

    /// Lives as long as the session backing store
    Session,

    /// Durable across restarts, TTL-checked on read
    Local,
}

impl Tier {
    /// All tiers in lookup order
    pub const ALL: [Tier; 3] = [Tier::Memory, Tier::Session, Tier::Local];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Session => "session",
            Tier::Local => "local",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one tier's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TierStats {
    /// Reads that returned a value
    pub hits: u64,

    /// Reads that returned nothing (absent, expired or unreadable)
    pub misses: u64,

    /// Successful writes
    pub writes: u64,

    /// Entries dropped because their TTL ran out
    pub expired: u64,

    /// Entries dropped to respect a size bound
    pub evictions: u64,

    /// Backing store failures swallowed by the tier
    pub errors: u64,
}

impl TierStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Live counters owned by a tier
#[derive(Debug, Default)]
pub(crate) struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl TierCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Statistics across all tiers plus the deduplicator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub memory: TierStats,
    pub session: TierStats,
    pub local: TierStats,

    /// Number of times a query function actually ran
    pub fetches: u64,

    /// Callers that attached to an already running query
    pub joined: u64,

    /// `cached_query` calls that ended in a fetch failure
    pub fetch_failures: u64,
}

impl CacheStats {
    /// Stats for one tier
    pub fn tier(&self, tier: Tier) -> &TierStats {
        match tier {
            Tier::Memory => &self.memory,
            Tier::Session => &self.session,
            Tier::Local => &self.local,
        }
    }

    /// Percentage of `cached_query` calls answered without running a query
    ///
    /// Every call ends in exactly one memory hit, session hit, local hit,
    /// started fetch or joined fetch.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory.hits + self.session.hits + self.local.hits;
        let total = hits + self.fetches + self.joined;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hit_rate: {:.2}%, memory: {}/{}, session: {}/{}, local: {}/{}, fetches: {}, joined: {}, failures: {} }}",
            self.hit_rate(),
            self.memory.hits,
            self.memory.misses,
            self.session.hits,
            self.session.misses,
            self.local.hits,
            self.local.misses,
            self.fetches,
            self.joined,
            self.fetch_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_display() {
        assert_eq!(format!("{}", Tier::Memory), "memory");
        assert_eq!(format!("{}", Tier::Session), "session");
        assert_eq!(format!("{}", Tier::Local), "local");
        assert_eq!(Tier::ALL[0], Tier::Memory);
    }

    #[test]
    fn test_tier_stats_hit_rate() {
        let stats = TierStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(TierStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = TierCounters::default();
        counters.hit();
        counters.hit();
        counters.miss();
        counters.expired(3);
        counters.error();

        let stats = counters.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expired, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.writes, 0);
    }

    #[test]
    fn test_cache_stats_hit_rate_and_display() {
        let stats = CacheStats {
            memory: TierStats {
                hits: 6,
                misses: 4,
                ..Default::default()
            },
            local: TierStats {
                hits: 1,
                ..Default::default()
            },
            fetches: 2,
            joined: 1,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 70.0);
        assert_eq!(stats.tier(Tier::Local).hits, 1);

        let display = format!("{}", stats);
        assert!(display.contains("hit_rate: 70.00%"));
        assert!(display.contains("fetches: 2"));
    }
}
