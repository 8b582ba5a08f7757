//! In-process tile store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::metadata::{PixelType, SummaryMetadata, TileKey, TileTags};
use crate::raster::buffer::patch_rect;
use crate::raster::Rect;

use super::{check_region_payload, check_tile_payload, StoreSource, StoredTile, TileStore};

// =============================================================================
// Memory Store
// =============================================================================

/// Tile store held entirely in memory.
///
/// Cloning shares the same tiles. Overwrites build the patched buffer off to
/// the side and swap it in, so readers always hold a complete old or new
/// buffer.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    name: String,
    pixel_type: PixelType,
    tiles: RwLock<HashMap<TileKey, StoredTile>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>, pixel_type: PixelType) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name: name.into(),
                pixel_type,
                tiles: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed(self.inner.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl TileStore for MemoryStore {
    async fn put_tile(
        &self,
        key: TileKey,
        tags: TileTags,
        pixels: Bytes,
    ) -> Result<(), StoreError> {
        self.check_open()?;
        check_tile_payload(&tags, self.inner.pixel_type.bytes_per_pixel(), pixels.len())?;
        self.inner
            .tiles
            .write()
            .await
            .insert(key, StoredTile { tags, pixels });
        Ok(())
    }

    async fn get_tile(&self, key: &TileKey) -> Result<Option<StoredTile>, StoreError> {
        Ok(self.inner.tiles.read().await.get(key).cloned())
    }

    async fn get_tags(&self, key: &TileKey) -> Result<Option<TileTags>, StoreError> {
        Ok(self
            .inner
            .tiles
            .read()
            .await
            .get(key)
            .map(|tile| tile.tags.clone()))
    }

    async fn overwrite_tile_region(
        &self,
        key: &TileKey,
        rect: Rect,
        pixels: Bytes,
    ) -> Result<(), StoreError> {
        self.check_open()?;
        let pixel_type = self.inner.pixel_type;

        let current = self
            .inner
            .tiles
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(StoreError::TileNotFound(*key))?;
        check_region_payload(&current.tags, rect, pixel_type.bytes_per_pixel(), pixels.len())?;

        let mut patched = current.pixels.to_vec();
        patch_rect(&mut patched, current.tags.width, pixel_type, rect, &pixels);

        self.inner.tiles.write().await.insert(
            *key,
            StoredTile {
                tags: current.tags,
                pixels: Bytes::from(patched),
            },
        );
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<TileKey>, StoreError> {
        let mut keys: Vec<TileKey> = self.inner.tiles.read().await.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn size_bytes(&self) -> u64 {
        self.inner
            .tiles
            .read()
            .await
            .values()
            .map(|tile| tile.pixels.len() as u64)
            .sum()
    }

    fn describe(&self) -> &str {
        &self.inner.name
    }
}

// =============================================================================
// Memory Store Source
// =============================================================================

/// Hands out one [`MemoryStore`] per level and remembers them, so a pyramid
/// can be reopened from the same source.
#[derive(Clone, Default)]
pub struct MemoryStoreSource {
    levels: Arc<Mutex<HashMap<u32, MemoryStore>>>,
    summary: Arc<Mutex<Option<SummaryMetadata>>>,
}

impl MemoryStoreSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store previously created for `level`.
    pub async fn level(&self, level: u32) -> Option<MemoryStore> {
        self.levels.lock().await.get(&level).cloned()
    }
}

#[async_trait]
impl StoreSource for MemoryStoreSource {
    type Store = MemoryStore;

    async fn create_level(
        &self,
        level: u32,
        summary: &SummaryMetadata,
    ) -> Result<MemoryStore, StoreError> {
        let pixel_type = summary
            .pixel_type()
            .map_err(|e| StoreError::Metadata(e.to_string()))?;
        let store = MemoryStore::new(format!("memory level {}", level), pixel_type);

        if level == 0 {
            *self.summary.lock().await = Some(summary.clone());
        }
        self.levels.lock().await.insert(level, store.clone());
        Ok(store)
    }

    async fn open_level(&self, level: u32) -> Result<Option<MemoryStore>, StoreError> {
        Ok(self.level(level).await)
    }

    async fn read_summary(&self) -> Result<SummaryMetadata, StoreError> {
        self.summary
            .lock()
            .await
            .clone()
            .ok_or_else(|| StoreError::Metadata("no full resolution level created".to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
