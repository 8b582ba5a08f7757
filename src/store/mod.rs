//! Per-level tile stores.
//!
//! Every resolution level of a pyramid is backed by one [`TileStore`]. A
//! [`StoreSource`] creates the store for a new level, or reopens an existing
//! one, so the pyramid never needs to know where tiles actually live.
//!
//! ```text
//!                PyramidStorage
//!                      │
//!          ┌───────────┼────────────┐
//!          ▼           ▼            ▼
//!      level 0      level 1  ...  level N      (TileStore)
//!          ▲           ▲            ▲
//!          └───────────┴────────────┘
//!                 StoreSource
//! ```
//!
//! Stores must tolerate any number of concurrent readers while the single
//! write pipeline mutates them, and must never expose a half-updated tile.

mod directory;
mod memory;
mod record;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;
use crate::metadata::{SummaryMetadata, TileKey, TileTags};
use crate::raster::Rect;

pub use directory::{level_dir_name, next_acquisition_name, DirectoryStore, DirectoryStoreSource};
pub use memory::{MemoryStore, MemoryStoreSource};
pub use record::{RecordHeader, HEADER_LEN, RECORD_MAGIC};

/// A tile as returned by a store: its tags plus its full pixel buffer.
#[derive(Debug, Clone)]
pub struct StoredTile {
    pub tags: TileTags,
    pub pixels: Bytes,
}

// =============================================================================
// Tile Store Trait
// =============================================================================

/// Storage backend for one resolution level.
#[async_trait]
pub trait TileStore: Send + Sync {
    /// Store a complete tile, replacing any earlier tile under the same key.
    ///
    /// The buffer must hold exactly `tags.width × tags.height` pixels.
    async fn put_tile(&self, key: TileKey, tags: TileTags, pixels: Bytes)
        -> Result<(), StoreError>;

    /// Fetch a tile, or `None` if nothing was stored under `key`.
    async fn get_tile(&self, key: &TileKey) -> Result<Option<StoredTile>, StoreError>;

    /// Fetch only the tags of a tile.
    async fn get_tags(&self, key: &TileKey) -> Result<Option<TileTags>, StoreError>;

    /// Replace the pixels inside `rect` of an existing tile.
    ///
    /// `pixels` holds the rectangle packed row by row. Readers observe either
    /// the whole update or none of it.
    async fn overwrite_tile_region(
        &self,
        key: &TileKey,
        rect: Rect,
        pixels: Bytes,
    ) -> Result<(), StoreError>;

    /// All keys currently stored, sorted.
    async fn list_keys(&self) -> Result<Vec<TileKey>, StoreError>;

    /// Flush and stop accepting writes. Reads remain possible.
    async fn close(&self) -> Result<(), StoreError>;

    /// Bytes occupied by the store's data.
    async fn size_bytes(&self) -> u64;

    /// Human-readable identifier for logging.
    fn describe(&self) -> &str;
}

// =============================================================================
// Store Source Trait
// =============================================================================

/// Factory for the per-level stores of one pyramid.
#[async_trait]
pub trait StoreSource: Send + Sync {
    type Store: TileStore + 'static;

    /// Create an empty store for `level`, persisting `summary` with it.
    async fn create_level(
        &self,
        level: u32,
        summary: &SummaryMetadata,
    ) -> Result<Self::Store, StoreError>;

    /// Reopen the store of an existing level, or `None` if the level was
    /// never created.
    async fn open_level(&self, level: u32) -> Result<Option<Self::Store>, StoreError>;

    /// Summary metadata persisted with the full-resolution level.
    async fn read_summary(&self) -> Result<SummaryMetadata, StoreError>;
}

/// Validate a whole-tile payload against its declared dimensions.
pub(crate) fn check_tile_payload(
    tags: &TileTags,
    bytes_per_pixel: usize,
    actual: usize,
) -> Result<(), StoreError> {
    let expected = tags.width as usize * tags.height as usize * bytes_per_pixel;
    if expected != actual {
        return Err(StoreError::PayloadSize { expected, actual });
    }
    Ok(())
}

/// Validate an overwrite rectangle and payload against a stored tile.
pub(crate) fn check_region_payload(
    tags: &TileTags,
    rect: Rect,
    bytes_per_pixel: usize,
    actual: usize,
) -> Result<(), StoreError> {
    if !rect.fits_within(tags.width, tags.height) {
        return Err(StoreError::RegionOutOfBounds {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            tile_width: tags.width,
            tile_height: tags.height,
        });
    }
    let expected = rect.width as usize * rect.height as usize * bytes_per_pixel;
    if expected != actual {
        return Err(StoreError::PayloadSize { expected, actual });
    }
    Ok(())
}
