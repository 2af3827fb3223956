//! Caller-side dispatch: serve from memory on the calling thread, push disk
//! reads and fetches onto the worker pool.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    cache::TieredCache, executor::WorkerPool, payload::ImagePayload, storage::ImageCache,
};

/// One image to load: the source URL (cache key) and a caller-chosen tag,
/// typically identifying the view that asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub url: String,
    pub tag: String,
}

impl LoadRequest {
    pub fn new(url: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tag: tag.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("Failed to fetch {url}: {message}")]
pub struct FetchError {
    pub url: String,
    pub message: String,
}

/// Turns a URL into a decoded image. Supplied by the host; called on a
/// worker thread.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<ImagePayload, FetchError>;
}

/// Receives loaded images, either on the calling thread (memory hit) or on a
/// worker thread.
pub type LoadCallback = Arc<dyn Fn(ImagePayload, &LoadRequest) + Send + Sync>;

/// Where a `load` call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Served from the memory tier; the callback already ran.
    Memory,
    /// Handed to the worker pool.
    Dispatched,
}

pub struct ImageLoader {
    cache: Arc<TieredCache>,
    fetcher: Arc<dyn ImageFetcher>,
    pool: Arc<WorkerPool>,
    on_loaded: LoadCallback,
}

impl ImageLoader {
    pub fn new(
        cache: Arc<TieredCache>,
        fetcher: Arc<dyn ImageFetcher>,
        pool: Arc<WorkerPool>,
        on_loaded: LoadCallback,
    ) -> Self {
        Self {
            cache,
            fetcher,
            pool,
            on_loaded,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Load `request.url`, delivering the image through the callback.
    ///
    /// Misses on the disk tier go to the fetcher; fetched images are handed
    /// to the callback first and then cached. Fetch failures are logged and
    /// produce no callback.
    pub fn load(&self, request: LoadRequest) -> LoadOutcome {
        if let Some(payload) = self.cache.peek_memory(&request.url) {
            (self.on_loaded)(payload, &request);
            return LoadOutcome::Memory;
        }

        let cache = self.cache.clone();
        let fetcher = self.fetcher.clone();
        let on_loaded = self.on_loaded.clone();
        self.pool.spawn(move || {
            if let Some(payload) = cache.get(&request.url) {
                on_loaded(payload, &request);
                return;
            }

            match fetcher.fetch(&request.url) {
                Ok(payload) => {
                    debug!("Fetched {}", request.url);
                    on_loaded(payload.clone(), &request);
                    cache.put(&request.url, &payload);
                }
                Err(e) => warn!("{}", e),
            }
        });

        LoadOutcome::Dispatched
    }

    /// Clear both tiers on the worker pool.
    pub fn clear_cache(&self) {
        let cache = self.cache.clone();
        self.pool.spawn(move || cache.clear());
    }
}
