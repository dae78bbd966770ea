//! Cache statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for cache activity, readable without the cache lock
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    replacements: AtomicU64,
    rejections: AtomicU64,
    deletes: AtomicU64,
    ttl_evictions: AtomicU64,
    purged: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// New records stored
    pub inserts: u64,
    /// Existing records refreshed in place
    pub replacements: u64,
    /// Inserts refused because the cache was full
    pub rejections: u64,
    /// Records removed by explicit delete
    pub deletes: u64,
    /// Records removed because their TTL ran out
    pub ttl_evictions: u64,
    /// Records removed by device purge or cleanup
    pub purged: u64,
    /// hits / (hits + misses)
    pub hit_ratio: f64,
}

impl CacheStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an insert
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an in-place replacement
    pub fn record_replace(&self) {
        self.replacements.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected insert
    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an explicit delete
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` TTL evictions
    pub fn record_evictions(&self, count: u64) {
        self.ttl_evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Record `count` records dropped by a purge
    pub fn record_purged(&self, count: u64) {
        self.purged.fetch_add(count, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total inserts
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Get total replacements
    pub fn replacements(&self) -> u64 {
        self.replacements.load(Ordering::Relaxed)
    }

    /// Get total rejected inserts
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Get total explicit deletes
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Get total TTL evictions
    pub fn ttl_evictions(&self) -> u64 {
        self.ttl_evictions.load(Ordering::Relaxed)
    }

    /// Get total purged records
    pub fn purged(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Copy every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            inserts: self.inserts(),
            replacements: self.replacements(),
            rejections: self.rejections(),
            deletes: self.deletes(),
            ttl_evictions: self.ttl_evictions(),
            purged: self.purged(),
            hit_ratio: self.hit_ratio(),
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.inserts,
            &self.replacements,
            &self.rejections,
            &self.deletes,
            &self.ttl_evictions,
            &self.purged,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
