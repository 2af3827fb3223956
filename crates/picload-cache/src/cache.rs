//! Two-tier cache façade

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    config::CacheConfig,
    disk::DiskTier,
    memory::MemoryTier,
    metrics::{CacheMetrics, CacheStats},
    payload::{EncodingFormat, ImagePayload},
    storage::{ImageCache, MemoryPressureAware, PersistentCache, PressureLevel},
};

/// Memory + disk image cache behind a single put/get/clear/trim contract.
///
/// Either tier may be absent; every forward is independently optional. The
/// disk tier does blocking I/O, so `get`, `put` and `clear` belong on a worker
/// thread. [`TieredCache::peek_memory`] and [`TieredCache::trim_memory`] never
/// touch disk and are safe anywhere.
pub struct TieredCache {
    memory: Option<Arc<dyn MemoryPressureAware>>,
    disk: Option<Arc<dyn PersistentCache>>,
    promote_disk_hits: bool,
    metrics: CacheMetrics,
    // Concrete handles kept for size reporting in `stats`.
    memory_tier: Option<Arc<MemoryTier>>,
    disk_tier: Option<Arc<DiskTier>>,
}

impl TieredCache {
    pub fn builder() -> TieredCacheBuilder {
        TieredCacheBuilder::new()
    }

    /// Build both tiers from configuration.
    ///
    /// A disk tier that cannot be opened is logged and left out, so the cache
    /// degrades to memory-only.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut builder = TieredCacheBuilder::new().promote_disk_hits(config.promote_disk_hits);

        if config.memory.enabled {
            let tier = match config.memory.max_memory_bytes {
                Some(bytes) => MemoryTier::with_memory_budget(bytes),
                None => MemoryTier::for_process(),
            };
            builder = builder.memory_tier(Arc::new(tier));
        }

        if config.disk.enabled {
            let directory = config.disk.resolved_directory();
            match DiskTier::open(&directory, config.disk.max_bytes) {
                Ok(tier) => {
                    let tier = tier
                        .with_max_entries(config.disk.max_entries)
                        .with_encoding(config.disk.encoding);
                    builder = builder.disk_tier(Arc::new(tier));
                }
                Err(e) => warn!(
                    "Disk tier unavailable at {}, continuing memory-only: {}",
                    directory.display(),
                    e
                ),
            }
        }

        builder.build()
    }

    pub fn has_memory_tier(&self) -> bool {
        self.memory.is_some()
    }

    pub fn has_disk_tier(&self) -> bool {
        self.disk.is_some()
    }

    pub fn promotes_disk_hits(&self) -> bool {
        self.promote_disk_hits
    }

    /// Memory-only lookup.
    pub fn peek_memory(&self, key: &str) -> Option<ImagePayload> {
        let payload = self.memory.as_ref()?.get(key)?;
        self.metrics.record_memory_hit();
        Some(payload)
    }

    /// Forward new encoding parameters to the disk tier.
    pub fn set_encoding_params(&self, format: EncodingFormat, quality: u8) {
        if let Some(ref disk) = self.disk {
            disk.set_encoding_params(format, quality);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.metrics.snapshot();
        if let Some(ref memory) = self.memory_tier {
            stats.memory_entries = memory.len();
            stats.memory_size_units = memory.size_units();
        }
        if let Some(ref disk) = self.disk_tier {
            stats.disk_entries = disk.len();
            stats.disk_size_bytes = disk.size_bytes();
        }
        stats
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

impl ImageCache for TieredCache {
    fn put(&self, key: &str, payload: &ImagePayload) {
        self.metrics.record_store();
        if let Some(ref memory) = self.memory {
            memory.put(key, payload);
        }
        if let Some(ref disk) = self.disk {
            disk.put(key, payload);
        }
    }

    fn get(&self, key: &str) -> Option<ImagePayload> {
        if let Some(payload) = self.peek_memory(key) {
            return Some(payload);
        }

        if let Some(ref disk) = self.disk {
            if let Some(payload) = disk.get(key) {
                self.metrics.record_disk_hit();
                if self.promote_disk_hits {
                    if let Some(ref memory) = self.memory {
                        memory.put(key, &payload);
                        self.metrics.record_promotion();
                        debug!("Promoted {} to memory tier", key);
                    }
                }
                return Some(payload);
            }
        }

        self.metrics.record_miss();
        None
    }

    fn clear(&self) {
        if let Some(ref memory) = self.memory {
            memory.clear();
        }
        if let Some(ref disk) = self.disk {
            disk.clear();
        }
    }
}

impl MemoryPressureAware for TieredCache {
    fn trim_memory(&self, level: PressureLevel) {
        if let Some(ref memory) = self.memory {
            memory.trim_memory(level);
        }
    }
}

impl PersistentCache for TieredCache {
    fn set_encoding_params(&self, format: EncodingFormat, quality: u8) {
        TieredCache::set_encoding_params(self, format, quality);
    }
}

/// Builder for [`TieredCache`]
pub struct TieredCacheBuilder {
    memory: Option<Arc<dyn MemoryPressureAware>>,
    disk: Option<Arc<dyn PersistentCache>>,
    memory_tier: Option<Arc<MemoryTier>>,
    disk_tier: Option<Arc<DiskTier>>,
    promote_disk_hits: bool,
}

impl TieredCacheBuilder {
    pub fn new() -> Self {
        Self {
            memory: None,
            disk: None,
            memory_tier: None,
            disk_tier: None,
            promote_disk_hits: true,
        }
    }

    /// Use the built-in memory tier
    pub fn memory_tier(mut self, tier: Arc<MemoryTier>) -> Self {
        self.memory = Some(tier.clone() as Arc<dyn MemoryPressureAware>);
        self.memory_tier = Some(tier);
        self
    }

    /// Use the built-in disk tier
    pub fn disk_tier(mut self, tier: Arc<DiskTier>) -> Self {
        self.disk = Some(tier.clone() as Arc<dyn PersistentCache>);
        self.disk_tier = Some(tier);
        self
    }

    /// Use a custom volatile tier
    pub fn memory(mut self, tier: Arc<dyn MemoryPressureAware>) -> Self {
        self.memory = Some(tier);
        self.memory_tier = None;
        self
    }

    /// Use a custom persistent tier
    pub fn disk(mut self, tier: Arc<dyn PersistentCache>) -> Self {
        self.disk = Some(tier);
        self.disk_tier = None;
        self
    }

    pub fn promote_disk_hits(mut self, promote: bool) -> Self {
        self.promote_disk_hits = promote;
        self
    }

    pub fn build(self) -> TieredCache {
        TieredCache {
            memory: self.memory,
            disk: self.disk,
            promote_disk_hits: self.promote_disk_hits,
            metrics: CacheMetrics::new(),
            memory_tier: self.memory_tier,
            disk_tier: self.disk_tier,
        }
    }
}

impl Default for TieredCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
