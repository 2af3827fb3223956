//! # picload cache
//!
//! Two-tier least-recently-used cache for decoded images keyed by source URL.
//!
//! ## Features
//!
//! - **Memory tier**: LRU bounded by decoded byte size (1/8 of the process
//!   memory budget), trimmed on host memory-pressure signals
//! - **Disk tier**: LRU bounded by entry count and file size, persisted as
//!   encoded files that survive restarts and are rediscovered lazily
//! - **Façade**: one put/get/clear/trim contract over both tiers, with
//!   optional promotion of disk hits into memory
//! - **Dispatch**: a small worker pool and loader that keep disk I/O off the
//!   calling thread
//!
//! The tiers are synchronous. `get`, `put` and `clear` may block on disk and
//! should run on a worker thread; `peek_memory` and `trim_memory` never do.

pub mod cache;
pub mod config;
pub mod disk;
pub mod error;
pub mod executor;
pub mod loader;
pub mod memory;
pub mod metrics;
pub mod payload;
pub mod shared;
pub mod storage;

pub use cache::{TieredCache, TieredCacheBuilder};
pub use config::{CacheConfig, DiskConfig, MemoryConfig};
pub use disk::{DiskEntry, DiskTier};
pub use error::CacheError;
pub use executor::WorkerPool;
pub use loader::{FetchError, ImageFetcher, ImageLoader, LoadCallback, LoadOutcome, LoadRequest};
pub use memory::MemoryTier;
pub use metrics::{CacheMetrics, CacheStats};
pub use payload::{EncodingFormat, EncodingParams, ImagePayload};
pub use shared::SharedCache;
pub use storage::{ImageCache, MemoryPressureAware, PersistentCache, PressureLevel};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CacheError>;
