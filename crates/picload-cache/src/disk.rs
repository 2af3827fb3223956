//! On-disk tier: encoded image files indexed by an in-memory LRU map.
//!
//! The index holds metadata only (path and file size). It is not persisted;
//! a fresh instance rediscovers files lazily when `get` misses the index and
//! a file already sits at the key's deterministic path.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    payload::{EncodingFormat, EncodingParams, ImagePayload},
    storage::{ImageCache, PersistentCache},
    CacheError, Result,
};

/// Prefix carried by every file this tier writes.
pub const CACHE_FILENAME_PREFIX: &str = "cache_";

/// Default entry-count ceiling.
pub const DEFAULT_MAX_ENTRIES: usize = 64;

/// Upper bound on evictions performed by a single flush pass.
pub const MAX_REMOVALS: usize = 4;

const BUFFER_SIZE: usize = 8 * 1024;

/// Index metadata for one cached file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
}

struct DiskIndex {
    entries: LruCache<String, DiskEntry>,
    size_bytes: u64,
}

impl DiskIndex {
    fn insert(&mut self, key: String, entry: DiskEntry) {
        self.size_bytes += entry.size_bytes;
        if let Some(previous) = self.entries.put(key, entry) {
            self.size_bytes = self.size_bytes.saturating_sub(previous.size_bytes);
        }
    }

    fn remove(&mut self, key: &str) -> Option<DiskEntry> {
        let entry = self.entries.pop(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Disk-backed LRU tier bounded by entry count and aggregate file size.
pub struct DiskTier {
    directory: PathBuf,
    index: Mutex<DiskIndex>,
    max_entries: usize,
    max_bytes: u64,
    encoding: RwLock<EncodingParams>,
}

impl DiskTier {
    /// Open a tier rooted at `directory` with a byte budget of `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if `max_bytes` is zero, or if the
    /// directory cannot be created, is not a directory, or is read-only.
    pub fn open<P: AsRef<Path>>(directory: P, max_bytes: u64) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        if max_bytes == 0 {
            return Err(CacheError::configuration("max_bytes must be greater than zero"));
        }

        if !directory.exists() {
            fs::create_dir_all(&directory).map_err(|e| {
                CacheError::configuration(format!(
                    "cannot create cache directory {}: {}",
                    directory.display(),
                    e
                ))
            })?;
        }

        let metadata = fs::metadata(&directory).map_err(|e| {
            CacheError::configuration(format!(
                "cannot read cache directory {}: {}",
                directory.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(CacheError::configuration(format!(
                "{} is not a directory",
                directory.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(CacheError::configuration(format!(
                "{} is not writable",
                directory.display()
            )));
        }

        info!(
            "Opened disk tier at {} (max {} bytes, {} entries)",
            directory.display(),
            max_bytes,
            DEFAULT_MAX_ENTRIES
        );

        Ok(Self {
            directory,
            index: Mutex::new(DiskIndex {
                entries: LruCache::unbounded(),
                size_bytes: 0,
            }),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes,
            encoding: RwLock::new(EncodingParams::default()),
        })
    }

    /// Override the entry-count ceiling.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the initial encoding parameters.
    pub fn with_encoding(self, params: EncodingParams) -> Self {
        *self.encoding.write() = params;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn encoding_params(&self) -> EncodingParams {
        *self.encoding.read()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate size of indexed files in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.index.lock().size_bytes
    }

    /// Whether `key` is indexed. Does not touch recency or the filesystem.
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.lock().entries.contains(&index_key(key))
    }

    /// Deterministic file path for `key` inside this tier's directory.
    pub fn file_path_for(&self, key: &str) -> PathBuf {
        cache_file_path(&self.directory, key)
    }

    /// Delete every prefixed file in the directory and reset the index.
    pub fn clear_cache(&self) {
        let mut index = self.index.lock();

        match remove_cache_files(&self.directory) {
            Ok(removed) => debug!(
                "Removed {} cache files from {}",
                removed,
                self.directory.display()
            ),
            Err(e) => warn!(
                "Failed to clear cache directory {}: {}",
                self.directory.display(),
                e
            ),
        }

        index.entries.clear();
        index.size_bytes = 0;
    }

    fn write_file(&self, payload: &ImagePayload, path: &Path) -> Result<u64> {
        let params = self.encoding_params();
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, File::create(path)?);
        payload.encode_to(&mut writer, params)?;
        writer.flush()?;
        drop(writer);
        Ok(fs::metadata(path)?.len())
    }

    /// Evict least-recently-used entries while over either limit, at most
    /// [`MAX_REMOVALS`] per call.
    fn flush(&self, index: &mut DiskIndex) {
        let mut removals = 0;
        while removals < MAX_REMOVALS
            && (index.entries.len() > self.max_entries || index.size_bytes > self.max_bytes)
        {
            let Some((key, entry)) = index.entries.pop_lru() else {
                break;
            };
            index.size_bytes = index.size_bytes.saturating_sub(entry.size_bytes);
            if let Err(e) = fs::remove_file(&entry.path) {
                warn!("Failed to delete evicted file {}: {}", entry.path.display(), e);
            }
            removals += 1;
            debug!(
                "Evicted {} from disk tier ({}, {} bytes)",
                key,
                entry.path.display(),
                entry.size_bytes
            );
        }
    }

    /// Look for a file left at the deterministic path, e.g. by an earlier
    /// process, and adopt it into the index if it decodes.
    fn probe(&self, index: &mut DiskIndex, key: &str) -> Option<ImagePayload> {
        let path = self.file_path_for(key);
        let size_bytes = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return None,
        };

        match ImagePayload::decode_file(&path) {
            Ok(payload) => {
                debug!("Disk cache hit (existing file) for {}", key);
                index.insert(key.to_string(), DiskEntry { path, size_bytes });
                self.flush(index);
                Some(payload)
            }
            Err(e) => {
                warn!("Discarding unreadable cache file {}: {}", path.display(), e);
                if let Err(e) = fs::remove_file(&path) {
                    debug!("Failed to delete {}: {}", path.display(), e);
                }
                None
            }
        }
    }
}

impl ImageCache for DiskTier {
    fn put(&self, key: &str, payload: &ImagePayload) {
        let key = index_key(key);
        let mut index = self.index.lock();
        if index.entries.contains(&key) {
            return;
        }

        let path = self.file_path_for(&key);
        match self.write_file(payload, &path) {
            Ok(size_bytes) => {
                index.insert(key, DiskEntry { path, size_bytes });
                self.flush(&mut index);
            }
            Err(e) => {
                warn!("Error in put for {}: {}", key, e);
                if let Err(e) = fs::remove_file(&path) {
                    debug!("Failed to delete partial file {}: {}", path.display(), e);
                }
            }
        }
    }

    fn get(&self, key: &str) -> Option<ImagePayload> {
        let key = index_key(key);
        let mut index = self.index.lock();

        if let Some(entry) = index.entries.get(&key) {
            let path = entry.path.clone();
            match ImagePayload::decode_file(&path) {
                Ok(payload) => {
                    debug!("Disk cache hit for {}", key);
                    return Some(payload);
                }
                Err(e) => {
                    warn!("Dropping stale index entry for {}: {}", key, e);
                    index.remove(&key);
                }
            }
        }

        self.probe(&mut index, &key)
    }

    fn clear(&self) {
        self.clear_cache();
    }
}

impl PersistentCache for DiskTier {
    fn set_encoding_params(&self, format: EncodingFormat, quality: u8) {
        *self.encoding.write() = EncodingParams::new(format, quality);
    }
}

/// Keys that differ only by `*` share one file, so they share one index slot.
fn index_key(key: &str) -> String {
    key.replace('*', "")
}

/// `<directory>/cache_<percent-encoded key with '*' removed>`
pub fn cache_file_path(directory: &Path, key: &str) -> PathBuf {
    directory.join(format!(
        "{}{}",
        CACHE_FILENAME_PREFIX,
        urlencoding::encode(&index_key(key))
    ))
}

fn remove_cache_files(directory: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let is_cache_file = entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.starts_with(CACHE_FILENAME_PREFIX));
        if is_cache_file && entry.file_type()?.is_file() {
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!("Failed to delete {}: {}", entry.path().display(), e);
            } else {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;

    fn solid(width: u32, height: u32, shade: u8) -> ImagePayload {
        ImagePayload::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([shade, shade, shade]),
        )))
    }

    fn png_tier(dir: &Path, max_bytes: u64) -> DiskTier {
        DiskTier::open(dir, max_bytes)
            .unwrap()
            .with_encoding(EncodingParams::new(EncodingFormat::Png, 100))
    }

    #[test]
    fn test_open_rejects_zero_budget() {
        let temp_dir = TempDir::new().unwrap();
        let result = DiskTier::open(temp_dir.path(), 0);
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("images");
        let tier = DiskTier::open(&dir, 1024).unwrap();
        assert!(dir.is_dir());
        assert_eq!(tier.max_entries(), DEFAULT_MAX_ENTRIES);
        assert_eq!(tier.max_bytes(), 1024);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_under_regular_file_is_configuration_error() {
        // A path below a regular file cannot be created.
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let result = DiskTier::open(file.join("child"), 1024);
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_open_rejects_file_path() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not_a_dir");
        fs::write(&file, b"x").unwrap();
        let result = DiskTier::open(&file, 1024);
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_file_path_strips_asterisks_and_encodes() {
        let dir = Path::new("/cache");
        let path = cache_file_path(dir, "https://a.b/c d*e?x=1");
        assert_eq!(
            path,
            PathBuf::from("/cache/cache_https%3A%2F%2Fa.b%2Fc%20de%3Fx%3D1")
        );
        assert_eq!(
            cache_file_path(dir, "**a*"),
            cache_file_path(dir, "a"),
        );
    }

    #[test]
    fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);
        let payload = solid(8, 8, 42);

        tier.put("https://example.com/1.png", &payload);
        assert!(tier.contains_key("https://example.com/1.png"));
        assert!(tier.file_path_for("https://example.com/1.png").is_file());

        let hit = tier.get("https://example.com/1.png").unwrap();
        assert_eq!(hit, payload);
        assert_eq!(
            tier.size_bytes(),
            fs::metadata(tier.file_path_for("https://example.com/1.png"))
                .unwrap()
                .len()
        );
    }

    #[test]
    fn test_first_writer_wins() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);
        let first = solid(4, 4, 10);
        let second = solid(4, 4, 200);

        tier.put("k", &first);
        tier.put("k", &second);

        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("k").unwrap(), first);
    }

    #[test]
    fn test_asterisk_variants_share_one_entry() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);
        let first = solid(4, 4, 10);

        tier.put("a", &first);
        tier.put("a*", &solid(4, 4, 200));
        tier.put("*a*", &solid(4, 4, 90));

        assert_eq!(tier.len(), 1);
        assert!(tier.contains_key("a*"));
        assert_eq!(tier.get("a").unwrap(), first);
        assert_eq!(tier.get("a*").unwrap(), first);
        assert_eq!(
            tier.size_bytes(),
            fs::metadata(tier.file_path_for("a")).unwrap().len()
        );
    }

    #[test]
    fn test_asterisk_variant_eviction_leaves_no_dangling_entry() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024).with_max_entries(1);

        tier.put("a", &solid(4, 4, 10));
        tier.put("a*", &solid(4, 4, 200));
        assert_eq!(tier.len(), 1);

        tier.put("b", &solid(4, 4, 30));
        assert_eq!(tier.len(), 1);
        assert!(!tier.contains_key("a"));
        assert!(!tier.file_path_for("a").exists());
        assert!(tier.get("b").is_some());
    }

    #[test]
    fn test_count_eviction() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024).with_max_entries(2);

        tier.put("one", &solid(4, 4, 1));
        tier.put("two", &solid(4, 4, 2));
        tier.put("three", &solid(4, 4, 3));

        assert_eq!(tier.len(), 2);
        assert!(!tier.file_path_for("one").exists());
        assert!(tier.get("one").is_none());
        assert!(tier.get("two").is_some());
        assert!(tier.get("three").is_some());
    }

    #[test]
    fn test_get_refreshes_recency() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024).with_max_entries(2);

        tier.put("one", &solid(4, 4, 1));
        tier.put("two", &solid(4, 4, 2));
        assert!(tier.get("one").is_some());
        tier.put("three", &solid(4, 4, 3));

        assert!(tier.contains_key("one"));
        assert!(!tier.contains_key("two"));
    }

    #[test]
    fn test_flush_respects_removal_cap() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);

        for i in 0..8 {
            tier.put(&format!("key-{}", i), &solid(4, 4, i as u8));
        }
        assert_eq!(tier.len(), 8);

        // Shrink the count ceiling: each put may evict at most four.
        let tier = tier.with_max_entries(1);
        tier.put("key-8", &solid(4, 4, 8));
        assert_eq!(tier.len(), 9 - MAX_REMOVALS);

        tier.put("key-9", &solid(4, 4, 9));
        assert_eq!(tier.len(), 10 - 2 * MAX_REMOVALS);

        tier.put("key-10", &solid(4, 4, 10));
        assert_eq!(tier.len(), 1);
        assert!(tier.contains_key("key-10"));
    }

    #[test]
    fn test_byte_budget_eviction() {
        let temp_dir = TempDir::new().unwrap();
        let probe = png_tier(temp_dir.path(), u64::MAX);
        probe.put("probe", &solid(16, 16, 7));
        let file_size = probe.size_bytes();
        probe.clear_cache();

        // Room for two files, not three.
        let tier = png_tier(temp_dir.path(), file_size * 2 + file_size / 2);
        tier.put("a", &solid(16, 16, 7));
        tier.put("b", &solid(16, 16, 7));
        assert_eq!(tier.len(), 2);

        tier.put("c", &solid(16, 16, 7));
        assert_eq!(tier.len(), 2);
        assert!(!tier.contains_key("a"));
        assert!(tier.size_bytes() <= tier.max_bytes());
    }

    #[test]
    fn test_clear_cache_removes_orphans_only_with_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);
        tier.put("indexed", &solid(4, 4, 1));

        let orphan = temp_dir.path().join(format!("{}orphan", CACHE_FILENAME_PREFIX));
        fs::write(&orphan, b"left behind").unwrap();
        let foreign = temp_dir.path().join("notes.txt");
        fs::write(&foreign, b"keep me").unwrap();

        tier.clear_cache();

        assert!(tier.is_empty());
        assert_eq!(tier.size_bytes(), 0);
        assert!(!orphan.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_cold_start_adopts_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let payload = solid(6, 6, 99);
        {
            let writer = png_tier(temp_dir.path(), 1024 * 1024);
            writer.put("https://example.com/cold.png", &payload);
        }

        let fresh = png_tier(temp_dir.path(), 1024 * 1024);
        assert!(!fresh.contains_key("https://example.com/cold.png"));

        let hit = fresh.get("https://example.com/cold.png").unwrap();
        assert_eq!(hit, payload);
        assert!(fresh.contains_key("https://example.com/cold.png"));
        assert!(fresh.size_bytes() > 0);
    }

    #[test]
    fn test_vanished_file_self_heals_as_miss() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);
        tier.put("gone", &solid(4, 4, 1));
        fs::remove_file(tier.file_path_for("gone")).unwrap();

        assert!(tier.get("gone").is_none());
        assert!(!tier.contains_key("gone"));
        assert_eq!(tier.size_bytes(), 0);
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);
        let path = tier.file_path_for("corrupt");
        fs::write(&path, b"not an image").unwrap();

        assert!(tier.get("corrupt").is_none());
        assert!(!path.exists());
        assert!(!tier.contains_key("corrupt"));
    }

    #[test]
    fn test_encoding_params_apply_to_later_puts() {
        let temp_dir = TempDir::new().unwrap();
        let tier = DiskTier::open(temp_dir.path(), 1024 * 1024).unwrap();
        assert_eq!(tier.encoding_params(), EncodingParams::default());

        tier.put("jpeg", &solid(8, 8, 5));
        tier.set_encoding_params(EncodingFormat::Png, 0);
        tier.put("png", &solid(8, 8, 5));

        let jpeg_bytes = fs::read(tier.file_path_for("jpeg")).unwrap();
        let png_bytes = fs::read(tier.file_path_for("png")).unwrap();
        assert_eq!(&jpeg_bytes[..2], &[0xff, 0xd8]);
        assert_eq!(&png_bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_failed_write_leaves_key_absent() {
        let temp_dir = TempDir::new().unwrap();
        let tier = png_tier(temp_dir.path(), 1024 * 1024);
        // File names are limited to 255 bytes on common filesystems.
        let key = "x".repeat(400);

        tier.put(&key, &solid(4, 4, 1));
        assert!(!tier.contains_key(&key));
        assert_eq!(tier.size_bytes(), 0);
    }
}
