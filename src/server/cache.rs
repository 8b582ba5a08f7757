//! LRU cache for encoded region previews.
//!
//! Only regions of a finished pyramid are cached; while an acquisition is
//! still running, the same request can return different pixels each time.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default cache capacity: 64MB
pub const DEFAULT_REGION_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 4_096;

// =============================================================================
// Cache Key
// =============================================================================

/// Identifies one encoded region response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionCacheKey {
    pub channel: u32,
    pub slice: u32,
    pub frame: u32,
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

// =============================================================================
// Region Cache
// =============================================================================

/// LRU cache of encoded regions with a byte-size budget.
pub struct RegionCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
}

struct CacheInner {
    entries: LruCache<RegionCacheKey, Bytes>,
    current_size: usize,
}

impl RegionCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGION_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache bounded by both bytes and entry count.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Get an entry, marking it recently used.
    pub async fn get(&self, key: &RegionCacheKey) -> Option<Bytes> {
        self.inner.lock().await.entries.get(key).cloned()
    }

    /// Insert an entry, evicting least-recently-used ones past capacity.
    pub async fn put(&self, key: RegionCacheKey, data: Bytes) {
        let mut inner = self.inner.lock().await;
        let data_size = data.len();

        if let Some(old) = inner.entries.pop(&key) {
            inner.current_size = inner.current_size.saturating_sub(old.len());
        }
        // With the old entry gone, push only returns entry-count evictions
        if let Some((_, evicted)) = inner.entries.push(key, data) {
            inner.current_size = inner.current_size.saturating_sub(evicted.len());
        }
        inner.current_size += data_size;

        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.current_size = 0;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Total bytes currently cached.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
