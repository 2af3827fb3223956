//! Configuration for the tiered image cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{disk::DEFAULT_MAX_ENTRIES, payload::EncodingParams, Result};

/// Top-level cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory tier settings
    pub memory: MemoryConfig,
    /// Disk tier settings
    pub disk: DiskConfig,
    /// Copy disk hits into the memory tier
    pub promote_disk_hits: bool,
}

/// Memory tier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Whether the memory tier is built
    pub enabled: bool,
    /// Process memory budget in bytes; detected from the system when unset
    pub max_memory_bytes: Option<u64>,
}

/// Disk tier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Whether the disk tier is built
    pub enabled: bool,
    /// Cache directory; the system temp dir is used when unset
    pub directory: Option<PathBuf>,
    /// Aggregate file size ceiling (10 MB)
    pub max_bytes: u64,
    /// Entry count ceiling
    pub max_entries: usize,
    /// Format and quality for written files
    pub encoding: EncodingParams,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            disk: DiskConfig::default(),
            promote_disk_hits: true,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_memory_bytes: None,
        }
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            max_bytes: 10 * 1024 * 1024,
            max_entries: DEFAULT_MAX_ENTRIES,
            encoding: EncodingParams::default(),
        }
    }
}

impl DiskConfig {
    /// Directory the disk tier should use.
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("picload").join("images"))
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file.
    ///
    /// Returns the defaults if the file doesn't exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Configuration with the disk tier rooted at `directory`.
    pub fn with_directory<P: Into<PathBuf>>(directory: P) -> Self {
        let mut config = Self::default();
        config.disk.directory = Some(directory.into());
        config
    }
}
