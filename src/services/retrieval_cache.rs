//! Retrieval caches.
//!
//! Two explicit cache objects shared by the retriever and index sync:
//! - [`DiscoveryCache`]: file lists per project root, with a TTL
//! - [`PreviewCache`]: per-file previews, bounded, evicting the oldest 20%
//!
//! # Lock Poisoning
//!
//! Both caches fail open: a poisoned lock reads as a miss and writes are
//! skipped. Caching only saves work; it never decides results.

use lru::LruCache;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// A file found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path.
    pub absolute: PathBuf,
    /// Path relative to the root, `/`-separated.
    pub relative: String,
    /// Size in bytes.
    pub size: u64,
}

struct DiscoveryEntry {
    files: Arc<Vec<DiscoveredFile>>,
    discovered_at: Instant,
}

/// Per-root discovery results with a TTL.
pub struct DiscoveryCache {
    entries: RwLock<HashMap<PathBuf, DiscoveryEntry>>,
    ttl: Duration,
}

impl DiscoveryCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached files for a root if they have not expired.
    #[must_use]
    pub fn get(&self, root: &Path) -> Option<Arc<Vec<DiscoveredFile>>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(root)?;
        if entry.discovered_at.elapsed() <= self.ttl {
            metrics::counter!("retrieval_cache_hits_total", "cache" => "discovery").increment(1);
            Some(Arc::clone(&entry.files))
        } else {
            None
        }
    }

    /// Stores files for a root, unless a fresh entry was stored concurrently.
    /// Expired entries for any root are dropped first.
    ///
    /// Returns the entry that is now cached.
    pub fn insert(&self, root: &Path, files: Vec<DiscoveredFile>) -> Arc<Vec<DiscoveredFile>> {
        let files = Arc::new(files);
        let Ok(mut entries) = self.entries.write() else {
            return files;
        };
        if let Some(existing) = entries.get(root)
            && existing.discovered_at.elapsed() <= self.ttl
        {
            return Arc::clone(&existing.files);
        }
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.discovered_at.elapsed() <= ttl);
        entries.insert(
            root.to_path_buf(),
            DiscoveryEntry {
                files: Arc::clone(&files),
                discovered_at: Instant::now(),
            },
        );
        files
    }

    /// Drops the entry for a root. Returns true if one existed.
    pub fn invalidate(&self, root: &Path) -> bool {
        self.entries
            .write()
            .map(|mut e| e.remove(root).is_some())
            .unwrap_or(false)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Number of cached roots, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cached preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// First lines of the file.
    pub text: String,
    /// Number of lines in `text`.
    pub line_count: u32,
}

/// Bounded preview cache.
///
/// Once the cache holds more than `capacity` entries, the oldest 20% are
/// evicted in one sweep. Reads use `peek`, so age is insertion order.
pub struct PreviewCache {
    cache: RwLock<LruCache<PathBuf, Arc<Preview>>>,
    capacity: usize,
}

impl PreviewCache {
    /// Creates a cache that sweeps once it exceeds `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: RwLock::new(LruCache::unbounded()),
            capacity: capacity.max(1),
        }
    }

    /// Returns a cached preview.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Arc<Preview>> {
        let cache = self.cache.read().ok()?;
        let hit = cache.peek(path).cloned();
        if hit.is_some() {
            metrics::counter!("retrieval_cache_hits_total", "cache" => "preview").increment(1);
        }
        hit
    }

    /// Inserts a preview if absent and returns the cached value.
    pub fn insert(&self, path: &Path, preview: Preview) -> Arc<Preview> {
        let preview = Arc::new(preview);
        let Ok(mut cache) = self.cache.write() else {
            return preview;
        };
        if let Some(existing) = cache.peek(path) {
            return Arc::clone(existing);
        }
        cache.put(path.to_path_buf(), Arc::clone(&preview));

        if cache.len() > self.capacity {
            let evict = (cache.len() / 5).max(1);
            for _ in 0..evict {
                cache.pop_lru();
            }
            metrics::counter!("retrieval_cache_evictions_total", "cache" => "preview")
                .increment(evict as u64);
            tracing::debug!(evicted = evict, remaining = cache.len(), "Preview cache sweep");
        }
        preview
    }

    /// Drops a cached preview. Returns true if one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.cache
            .write()
            .map(|mut c| c.pop(path).is_some())
            .unwrap_or(false)
    }

    /// Number of cached previews.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Both retrieval caches, injected into the retriever and index sync.
pub struct RetrievalCache {
    /// Discovery results.
    pub discovery: DiscoveryCache,
    /// File previews.
    pub previews: PreviewCache,
}

impl RetrievalCache {
    /// Creates caches with the given TTL and preview capacity.
    #[must_use]
    pub fn new(discovery_ttl: Duration, preview_capacity: usize) -> Self {
        Self {
            discovery: DiscoveryCache::new(discovery_ttl),
            previews: PreviewCache::new(preview_capacity),
        }
    }

    /// Invalidates the discovery entry for `root` and the previews of the
    /// given absolute paths. Returns the number of entries dropped.
    pub fn invalidate_files(&self, root: &Path, files: &[PathBuf]) -> usize {
        let mut dropped = usize::from(self.discovery.invalidate(root));
        dropped += files
            .iter()
            .filter(|f| self.previews.invalidate(f))
            .count();
        dropped
    }
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> DiscoveredFile {
        DiscoveredFile {
            absolute: PathBuf::from("/p").join(name),
            relative: name.to_string(),
            size: 1,
        }
    }

    fn preview(text: &str) -> Preview {
        Preview {
            text: text.to_string(),
            line_count: 1,
        }
    }

    #[test]
    fn test_discovery_hit_and_expiry() {
        let cache = DiscoveryCache::new(Duration::from_secs(60));
        let root = Path::new("/p");
        assert!(cache.get(root).is_none());
        cache.insert(root, vec![file("a.rs")]);
        assert_eq!(cache.get(root).unwrap().len(), 1);

        let expired = DiscoveryCache::new(Duration::ZERO);
        expired.insert(root, vec![file("a.rs")]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(expired.get(root).is_none());
    }

    #[test]
    fn test_discovery_insert_if_absent() {
        let cache = DiscoveryCache::new(Duration::from_secs(60));
        let root = Path::new("/p");
        cache.insert(root, vec![file("a.rs")]);
        let kept = cache.insert(root, vec![file("a.rs"), file("b.rs")]);
        assert_eq!(kept.len(), 1);
        assert!(cache.invalidate(root));
        assert!(!cache.invalidate(root));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_discovery_insert_drops_expired_roots() {
        let cache = DiscoveryCache::new(Duration::from_millis(20));
        cache.insert(Path::new("/a"), vec![file("a.rs")]);
        cache.insert(Path::new("/b"), vec![file("b.rs")]);
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(40));
        cache.insert(Path::new("/c"), vec![file("c.rs")]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(Path::new("/c")).is_some());
    }

    #[test]
    fn test_preview_eviction_sweeps_oldest_fifth() {
        let cache = PreviewCache::new(100);
        for i in 0..=100 {
            cache.insert(&PathBuf::from(format!("/p/{i}.rs")), preview("x"));
        }
        // 101 entries > 100 -> evict 101/5 = 20 oldest
        assert_eq!(cache.len(), 81);
        assert!(cache.get(Path::new("/p/0.rs")).is_none());
        assert!(cache.get(Path::new("/p/19.rs")).is_none());
        assert!(cache.get(Path::new("/p/20.rs")).is_some());
        assert!(cache.get(Path::new("/p/100.rs")).is_some());
    }

    #[test]
    fn test_preview_insert_if_absent() {
        let cache = PreviewCache::new(10);
        let path = Path::new("/p/a.rs");
        cache.insert(path, preview("first"));
        let kept = cache.insert(path, preview("second"));
        assert_eq!(kept.text, "first");
        assert!(cache.invalidate(path));
        assert!(cache.get(path).is_none());
    }

    #[test]
    fn test_invalidate_files() {
        let cache = RetrievalCache::default();
        let root = Path::new("/p");
        cache.discovery.insert(root, vec![file("a.rs")]);
        cache.previews.insert(Path::new("/p/a.rs"), preview("a"));
        let dropped = cache.invalidate_files(root, &[PathBuf::from("/p/a.rs"), PathBuf::from("/p/b.rs")]);
        assert_eq!(dropped, 2);
    }
}
