//! Cache statistics tracking

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters updated by the cache engine.
///
/// Each counter is bumped atomically outside the engine mutex. A hit or
/// miss is recorded before the matching request, and snapshots read
/// `requests` first, so a snapshot never reports more requests than
/// hits + misses.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    requests: AtomicU64,
}

impl StatsRecorder {
    /// Create new stats tracker
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Release);
    }

    /// Record a cache miss
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Release);
    }

    /// Record `count` evictions
    pub(crate) fn record_evictions(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Build an immutable view of the counters
    pub(crate) fn snapshot(&self) -> CacheStats {
        let requests = self.requests.load(Ordering::Acquire);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let evictions = self.evictions.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            evictions,
            requests,
        }
    }

    /// Reset all statistics
    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.requests.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheStats {
    hits: u64,
    misses: u64,
    evictions: u64,
    requests: u64,
}

impl CacheStats {
    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Get total evictions
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Get total lookups (`hits + misses` once the cache is quiet)
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }

    /// Calculate miss ratio (0.0 to 1.0)
    pub fn miss_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.misses as f64 / self.requests as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} requests={} hit_ratio={:.3}",
            self.hits,
            self.misses,
            self.evictions,
            self.requests,
            self.hit_ratio()
        )
    }
}
