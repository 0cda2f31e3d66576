//! In-memory container cache.
//!
//! Caches parsed Containers per file so repeated playlist and segment
//! requests skip the moov parse. Entries are only reused while the file's
//! modification time and size are unchanged.

use dashmap::DashMap;
use hlsforged_media::Container;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Entry in the container cache.
struct CacheEntry {
    container: Arc<Container>,
    last_accessed: Instant,
    file_modified: Option<SystemTime>,
    file_size: u64,
}

/// Thread-safe cache of parsed containers keyed by file path.
pub struct ContainerCache {
    entries: DashMap<PathBuf, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
}

impl ContainerCache {
    /// Create a new container cache.
    pub fn new(max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Get a container from cache or load it.
    pub fn get_or_load<F, E>(&self, file_path: &Path, load: F) -> Result<Arc<Container>, E>
    where
        F: FnOnce(&Path) -> Result<Container, E>,
    {
        let (file_modified, file_size) = file_identity(file_path);

        if let Some(mut entry) = self.entries.get_mut(file_path) {
            if self.is_entry_valid(&entry, file_modified, file_size) {
                entry.last_accessed = Instant::now();
                tracing::trace!(path = ?file_path, "Container cache hit");
                return Ok(Arc::clone(&entry.container));
            }
            // Entry is stale, remove it
            drop(entry);
            self.entries.remove(file_path);
        }

        let container = Arc::new(load(file_path)?);

        if self.max_entries == 0 {
            return Ok(container);
        }

        // Evict old entries if at capacity
        while self.entries.len() >= self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }

        self.entries.insert(
            file_path.to_owned(),
            CacheEntry {
                container: Arc::clone(&container),
                last_accessed: Instant::now(),
                file_modified,
                file_size,
            },
        );
        Ok(container)
    }

    /// Remove an entry from the cache.
    pub fn remove(&self, file_path: &Path) {
        self.entries.remove(file_path);
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_accessed) < self.ttl);
    }

    fn is_entry_valid(&self, entry: &CacheEntry, modified: Option<SystemTime>, size: u64) -> bool {
        if entry.last_accessed.elapsed() >= self.ttl {
            return false;
        }
        entry.file_modified == modified && entry.file_size == size
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

impl Default for ContainerCache {
    fn default() -> Self {
        Self::new(64, 300)
    }
}

fn file_identity(path: &Path) -> (Option<SystemTime>, u64) {
    match std::fs::metadata(path) {
        Ok(metadata) => (metadata.modified().ok(), metadata.len()),
        Err(_) => (None, 0),
    }
}
