//! Hit/miss accounting for the tiered cache

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of cache activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served by the memory tier
    pub memory_hits: u64,
    /// Lookups served by the disk tier
    pub disk_hits: u64,
    /// Lookups no tier could serve
    pub misses: u64,
    /// Payloads handed to `put`
    pub stores: u64,
    /// Disk hits copied into the memory tier
    pub promotions: u64,
    /// Entries held by the memory tier
    pub memory_entries: usize,
    /// Memory tier size in KiB units
    pub memory_size_units: u64,
    /// Entries indexed by the disk tier
    pub disk_entries: usize,
    /// Disk tier size in bytes
    pub disk_size_bytes: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    /// Hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits() as f64 / total as f64) * 100.0
        }
    }

    /// Share of hits served without touching disk, as a percentage
    pub fn memory_hit_share(&self) -> f64 {
        let hits = self.hits();
        if hits == 0 {
            0.0
        } else {
            (self.memory_hits as f64 / hits as f64) * 100.0
        }
    }
}

/// Thread-safe counters
#[derive(Debug)]
pub struct CacheMetrics {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    promotions: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        }
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter snapshot. Tier sizes are left at zero for the caller to fill.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            memory_hits: 60,
            disk_hits: 15,
            misses: 25,
            ..CacheStats::default()
        };

        assert_eq!(stats.hits(), 75);
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(stats.memory_hit_share(), 80.0);
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.memory_hit_share(), 0.0);
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = CacheMetrics::new();
        metrics.record_memory_hit();
        metrics.record_disk_hit();
        metrics.record_disk_hit();
        metrics.record_miss();
        metrics.record_store();
        metrics.record_promotion();

        let stats = metrics.snapshot();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.disk_hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.promotions, 1);
        assert_eq!(stats.memory_entries, 0);
    }
}
