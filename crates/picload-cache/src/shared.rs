//! Once-initialized owner handle for the tiered cache.
//!
//! Construct one [`SharedCache`] at application start and pass it by reference
//! to whatever needs cache access. The cache itself is opened on first use and
//! every caller afterwards receives the same instance.

use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::{cache::TieredCache, config::CacheConfig};

pub struct SharedCache {
    config: CacheConfig,
    cache: OnceLock<Arc<TieredCache>>,
}

impl SharedCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            cache: OnceLock::new(),
        }
    }

    /// Wrap an already-built cache.
    pub fn with_cache(config: CacheConfig, cache: Arc<TieredCache>) -> Self {
        let shared = Self::new(config);
        // A fresh OnceLock is always empty.
        let _ = shared.cache.set(cache);
        shared
    }

    /// Return the cache, opening it from configuration on first call.
    pub fn get_or_open(&self) -> Arc<TieredCache> {
        self.cache
            .get_or_init(|| {
                info!("Opening shared image cache");
                Arc::new(TieredCache::from_config(&self.config))
            })
            .clone()
    }

    /// The cache if it has been opened.
    pub fn get(&self) -> Option<Arc<TieredCache>> {
        self.cache.get().cloned()
    }

    pub fn is_open(&self) -> bool {
        self.cache.get().is_some()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tempfile::TempDir;

    use super::*;

    fn config(dir: &std::path::Path) -> CacheConfig {
        let mut config = CacheConfig::with_directory(dir);
        config.memory.max_memory_bytes = Some(16 * 1024 * 1024);
        config
    }

    #[test]
    fn test_opens_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let shared = SharedCache::new(config(temp_dir.path()));
        assert!(!shared.is_open());
        assert!(shared.get().is_none());

        let cache = shared.get_or_open();
        assert!(shared.is_open());
        assert!(Arc::ptr_eq(&cache, &shared.get().unwrap()));
    }

    #[test]
    fn test_concurrent_callers_share_one_instance() {
        let temp_dir = TempDir::new().unwrap();
        let shared = Arc::new(SharedCache::new(config(temp_dir.path())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || shared.get_or_open())
            })
            .collect();

        let caches: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for cache in &caches[1..] {
            assert!(Arc::ptr_eq(&caches[0], cache));
        }
    }

    #[test]
    fn test_with_cache_uses_given_instance() {
        let cache = Arc::new(TieredCache::builder().build());
        let shared = SharedCache::with_cache(CacheConfig::default(), cache.clone());
        assert!(Arc::ptr_eq(&cache, &shared.get_or_open()));
    }
}
