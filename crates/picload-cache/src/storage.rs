//! Capabilities shared by the cache tiers and the façade.
//!
//! Every tier implements [`ImageCache`]. A tier that holds volatile memory
//! additionally implements [`MemoryPressureAware`]; a tier that writes
//! encoded files implements [`PersistentCache`].

use serde::{Deserialize, Serialize};

use crate::payload::{EncodingFormat, ImagePayload};

/// Basic key → image cache
pub trait ImageCache: Send + Sync {
    /// Store a payload under `key`
    fn put(&self, key: &str, payload: &ImagePayload);

    /// Retrieve a payload, or `None` on miss
    fn get(&self, key: &str) -> Option<ImagePayload>;

    /// Remove every entry
    fn clear(&self);
}

/// A cache that can shed entries when the host signals memory pressure.
pub trait MemoryPressureAware: ImageCache {
    /// Must not block on I/O.
    fn trim_memory(&self, level: PressureLevel);
}

/// A cache that persists encoded payloads.
pub trait PersistentCache: ImageCache {
    /// Applies to subsequent writes only.
    fn set_encoding_params(&self, format: EncodingFormat, quality: u8);
}

/// Coarse memory-scarcity signal from the host process.
///
/// Values follow the usual host trim-level scale, so a raw level received
/// from the platform can be wrapped directly with [`PressureLevel::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PressureLevel(u32);

impl PressureLevel {
    pub const RUNNING_MODERATE: PressureLevel = PressureLevel(5);
    pub const RUNNING_LOW: PressureLevel = PressureLevel(10);
    pub const RUNNING_CRITICAL: PressureLevel = PressureLevel(15);
    pub const UI_HIDDEN: PressureLevel = PressureLevel(20);
    /// Halve the memory tier.
    pub const BACKGROUND: PressureLevel = PressureLevel(40);
    /// Empty the memory tier.
    pub const MODERATE: PressureLevel = PressureLevel(60);
    pub const COMPLETE: PressureLevel = PressureLevel(80);

    pub const fn new(level: u32) -> Self {
        PressureLevel(level)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PressureLevel {
    fn from(level: u32) -> Self {
        PressureLevel(level)
    }
}
