//! Test utilities for integration tests.
//!
//! Scratch directories, tile builders and small pyramid fixtures.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use mosaic_store::{
    MemoryStoreSource, PixelType, PyramidOptions, PyramidStorage, StoreSource, SummaryMetadata,
    TileKey, TileTags,
};

// =============================================================================
// Scratch Directories
// =============================================================================

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

/// A unique directory under the system temp dir, removed on drop.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "mosaic-store-it-{}-{}-{}",
            name,
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Square gray8 summary with symmetric overlap.
pub fn gray8_summary(prefix: &str, size: u32, overlap: u32) -> SummaryMetadata {
    SummaryMetadata::new(prefix, size, size, PixelType::Gray8).with_overlap(overlap, overlap)
}

/// A tile filled with one value.
pub fn solid_tile(len: usize, value: u8) -> Bytes {
    Bytes::from(vec![value; len])
}

/// A gray8 tile whose pixel `(x, y)` is `(x + y * width + seed) % 256`.
pub fn gradient_tile(width: u32, height: u32, seed: u32) -> Bytes {
    let pixels: Vec<u8> = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x + y * width + seed) % 256) as u8))
        .collect();
    Bytes::from(pixels)
}

pub async fn memory_pyramid(summary: SummaryMetadata) -> Arc<PyramidStorage<MemoryStoreSource>> {
    Arc::new(
        PyramidStorage::create(MemoryStoreSource::new(), summary, PyramidOptions::default())
            .await
            .unwrap(),
    )
}

/// Register `(row, col)` and ingest `pixels` there on channel/slice/frame 0.
pub async fn ingest_at<S: StoreSource + 'static>(
    pyramid: &PyramidStorage<S>,
    row: i64,
    col: i64,
    pixels: Bytes,
) -> u32 {
    let geometry = *pyramid.geometry();
    let position = pyramid
        .register_grid_position(
            row,
            col,
            col as f64 * geometry.tile_width as f64,
            row as f64 * geometry.tile_height as f64,
        )
        .await;
    let key = TileKey::new(0, 0, 0, position);
    pyramid
        .ingest_tile(0, 0, 0, position, pixels, TileTags::new(key, 0, 0))
        .await
        .unwrap();
    position
}

// =============================================================================
// JPEG
// =============================================================================

/// Check for JPEG SOI and EOI markers.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }

    if data[0] != 0xFF || data[1] != 0xD8 {
        return false;
    }

    let len = data.len();
    data[len - 2] == 0xFF && data[len - 1] == 0xD9
}
