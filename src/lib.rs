//! # Mosaic Store
//!
//! Multi-resolution storage for tiled microscopy acquisitions.
//!
//! A microscope acquires a mosaic one stage position at a time. Each tile is
//! written at full resolution and immediately folded into every coarser level
//! of a 2× pyramid, so a viewer can read stitched regions at any zoom while
//! the acquisition is still running.
//!
//! ## Features
//!
//! - **Incremental pyramid**: each ingested tile updates one quadrant per level
//! - **Growing mosaics**: new levels are created and backfilled as the grid grows,
//!   in any direction, including negative grid coordinates
//! - **Overlap aware**: full-resolution tiles keep their overlap; coarser
//!   levels are overlap-free
//! - **Durable layout**: one directory per level with a summary and an
//!   append-only tile file, reopenable after a crash
//! - **Live previews**: an HTTP service stitching regions as JPEG
//!
//! ## Architecture
//!
//! - [`metadata`] - Summary metadata, tile keys and tags
//! - [`coords`] - Position index, grid placement and pixel/stage conversion
//! - [`raster`] - Pixel buffers, 2×2 downsampling and JPEG encoding
//! - [`store`] - Per-level tile stores (in memory and on disk)
//! - [`pipeline`] - Ordered single-worker write queue
//! - [`pyramid`] - The pyramid orchestrator
//! - [`server`] - Axum-based HTTP preview service
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use mosaic_store::{
//!     DirectoryStoreSource, PixelType, PyramidOptions, PyramidStorage, SummaryMetadata, TileKey,
//!     TileTags,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = DirectoryStoreSource::create_acquisition(std::path::Path::new("/data"), "mosaic").await?;
//! let summary = SummaryMetadata::new("mosaic", 512, 512, PixelType::Gray16);
//! let pyramid = PyramidStorage::create(source, summary, PyramidOptions::default()).await?;
//!
//! let position = pyramid.register_grid_position(0, 0, 0.0, 0.0).await;
//! let key = TileKey::new(0, 0, 0, position);
//! let pixels = Bytes::from(vec![0u8; 512 * 512 * 2]);
//! pyramid
//!     .ingest_tile(0, 0, 0, position, pixels, TileTags::new(key, 512, 512))
//!     .await?;
//!
//! let region = pyramid.read_region(0, 0, 0, 0, 0, 0, 256, 256).await?;
//! assert_eq!(region.data.len(), 256 * 256 * 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coords;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod pyramid;
pub mod raster;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::{Cli, Command, DatasetArgs, ExportConfig, InfoConfig, ServeConfig};
pub use coords::{AffineTransform, CoordinateIndex, GridExtent, Quadrant, StagePosition};
pub use error::{
    CoordinateError, DownsampleError, EncodeError, MetadataError, PyramidError, RegionError,
    StoreError,
};
pub use metadata::{PixelType, SummaryMetadata, TileGeometry, TileKey, TileTags};
pub use pipeline::{WriteHandle, WritePipeline, WriteTask, DEFAULT_WRITE_QUEUE_DEPTH};
pub use pyramid::{required_max_level, PyramidOptions, PyramidStorage, DEFAULT_TOP_LEVEL_TILES};
pub use raster::{downsample, Rect, Region, RegionEncoder, DEFAULT_JPEG_QUALITY};
pub use server::{create_router, AppState, RegionCache, RouterConfig};
pub use store::{
    DirectoryStore, DirectoryStoreSource, MemoryStore, MemoryStoreSource, StoreSource, StoredTile,
    TileStore,
};
