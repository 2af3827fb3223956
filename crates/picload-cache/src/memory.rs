//! In-memory tier: byte-budgeted LRU of decoded images.

use lru::LruCache;
use parking_lot::Mutex;
use sysinfo::System;
use tracing::debug;

use crate::{
    payload::ImagePayload,
    storage::{ImageCache, MemoryPressureAware, PressureLevel},
};

/// Size of one cache unit in bytes. Budget and entry cost are both counted in
/// these units.
pub const UNIT_BYTES: u64 = 1024;

/// Fraction of the process memory budget handed to the memory tier.
pub const MEMORY_FRACTION: u64 = 8;

struct MemoryState {
    entries: LruCache<String, ImagePayload>,
    size_units: u64,
}

/// In-memory LRU tier bounded by the summed decoded size of its payloads.
///
/// There is no entry-count ceiling. Inserting past the budget evicts the
/// least-recently-used payloads until the tier fits again.
pub struct MemoryTier {
    state: Mutex<MemoryState>,
    max_units: u64,
}

impl MemoryTier {
    /// Create a tier with a budget of `max_units` KiB.
    pub fn new(max_units: u64) -> Self {
        debug!("Created memory tier with budget of {} KiB", max_units);
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                size_units: 0,
            }),
            max_units,
        }
    }

    /// Create a tier sized at 1/8 of `max_memory_bytes`.
    pub fn with_memory_budget(max_memory_bytes: u64) -> Self {
        Self::new(max_memory_bytes / UNIT_BYTES / MEMORY_FRACTION)
    }

    /// Create a tier sized from the memory available to this process.
    pub fn for_process() -> Self {
        Self::with_memory_budget(process_memory_budget())
    }

    /// Cost of a payload in cache units, rounded up.
    pub fn size_of(payload: &ImagePayload) -> u64 {
        (payload.byte_count() as u64).div_ceil(UNIT_BYTES)
    }

    pub fn max_units(&self) -> u64 {
        self.max_units
    }

    /// Current aggregate size in cache units.
    pub fn size_units(&self) -> u64 {
        self.state.lock().size_units
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check membership without touching recency.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Evict least-recently-used entries until the aggregate size is at most
    /// `target_units`.
    pub fn trim_to_size(&self, target_units: u64) {
        let mut state = self.state.lock();
        Self::evict_to_size(&mut state, target_units);
    }

    /// Evict least-recently-used entries until at most `target_len` remain.
    pub fn trim_to_len(&self, target_len: usize) {
        let mut state = self.state.lock();
        Self::evict_to_len(&mut state, target_len);
    }

    fn evict_to_len(state: &mut MemoryState, target_len: usize) {
        while state.entries.len() > target_len {
            if !Self::evict_eldest(state) {
                break;
            }
        }
    }

    fn evict_to_size(state: &mut MemoryState, target_units: u64) {
        while state.size_units > target_units {
            if !Self::evict_eldest(state) {
                break;
            }
        }
    }

    fn evict_eldest(state: &mut MemoryState) -> bool {
        match state.entries.pop_lru() {
            Some((key, payload)) => {
                state.size_units = state.size_units.saturating_sub(Self::size_of(&payload));
                debug!("Evicted {} from memory tier", key);
                true
            }
            None => false,
        }
    }
}

impl ImageCache for MemoryTier {
    fn put(&self, key: &str, payload: &ImagePayload) {
        let mut state = self.state.lock();
        state.size_units += Self::size_of(payload);
        if let Some(previous) = state.entries.put(key.to_string(), payload.clone()) {
            state.size_units = state.size_units.saturating_sub(Self::size_of(&previous));
        }
        Self::evict_to_size(&mut state, self.max_units);
    }

    fn get(&self, key: &str) -> Option<ImagePayload> {
        self.state.lock().entries.get(key).cloned()
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.size_units = 0;
    }
}

impl MemoryPressureAware for MemoryTier {
    fn trim_memory(&self, level: PressureLevel) {
        if level >= PressureLevel::MODERATE {
            debug!("Memory pressure {}: clearing memory tier", level.value());
            self.clear();
        } else if level >= PressureLevel::BACKGROUND {
            let mut state = self.state.lock();
            let target = state.entries.len() / 2;
            debug!(
                "Memory pressure {}: trimming memory tier to {} entries",
                level.value(),
                target
            );
            Self::evict_to_len(&mut state, target);
        }
    }
}

/// Total memory this process may use, in bytes.
pub fn process_memory_budget() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory()
}
