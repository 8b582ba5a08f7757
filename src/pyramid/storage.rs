//! The pyramid orchestrator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::coords::{AffineTransform, CoordinateIndex, GridExtent, Quadrant};
use crate::error::{CoordinateError, PyramidError, StoreError};
use crate::metadata::{PixelType, SummaryMetadata, TileGeometry, TileKey, TileTags};
use crate::pipeline::{await_all, WriteHandle, WritePipeline, WriteTask, DEFAULT_WRITE_QUEUE_DEPTH};
use crate::raster::buffer::{copy_rect, extract_rect};
use crate::raster::{downsample, Region};
use crate::store::{StoreSource, StoredTile, TileStore};

use super::region::plan_region;

/// Default number of tiles the coarsest level spans along its longer side.
pub const DEFAULT_TOP_LEVEL_TILES: u32 = 1;

// =============================================================================
// Options
// =============================================================================

/// Tuning knobs for a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidOptions {
    /// Grow the pyramid until the coarsest level spans at most this many
    /// tiles along the mosaic's longer side
    pub top_level_tiles: u32,

    /// Writes that may be queued before ingest blocks
    pub write_queue_depth: usize,
}

impl Default for PyramidOptions {
    fn default() -> Self {
        Self {
            top_level_tiles: DEFAULT_TOP_LEVEL_TILES,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        }
    }
}

/// Smallest level `L` with `top_level_tiles × 2^L >= max(tiles_wide, tiles_high)`.
pub fn required_max_level(tiles_wide: u64, tiles_high: u64, top_level_tiles: u32) -> u32 {
    let span = tiles_wide.max(tiles_high);
    let top = top_level_tiles.max(1) as u64;
    let mut level = 0;
    while top.checked_shl(level).map_or(false, |covered| covered < span) {
        level += 1;
    }
    level
}

/// State owned by whoever holds the ingest lock.
#[derive(Debug, Default)]
struct IngestState {
    /// Grid extent of every ingested full-resolution position
    extent: Option<GridExtent>,
}

// =============================================================================
// Pyramid Storage
// =============================================================================

/// Multi-resolution tile pyramid over one [`StoreSource`].
///
/// Level 0 holds the tiles as acquired, overlap included. Every coarser level
/// holds overlap-free tiles, each the 2×2 box average of four tiles one level
/// down. Levels are added as the mosaic grows and are never removed.
///
/// # Concurrency
///
/// One producer calls [`ingest_tile`](Self::ingest_tile); concurrent calls are
/// serialized. Any number of readers may call
/// [`read_region`](Self::read_region) and [`get_tile`](Self::get_tile)
/// meanwhile; they see each tile either before or after an update, never a
/// mix.
pub struct PyramidStorage<S: StoreSource + 'static> {
    source: S,
    summary: SummaryMetadata,
    geometry: TileGeometry,
    options: PyramidOptions,

    full_res: Arc<S::Store>,
    low_res: RwLock<BTreeMap<u32, Arc<S::Store>>>,
    index: RwLock<CoordinateIndex>,
    pipeline: WritePipeline<S::Store>,
    max_level: AtomicU32,

    ingest: Mutex<IngestState>,
    closing: AtomicBool,
    finished: AtomicBool,
    poisoned: AtomicBool,
    read_only: bool,
}

impl<S: StoreSource + 'static> PyramidStorage<S> {
    /// Start a new pyramid, creating its full-resolution store.
    pub async fn create(
        source: S,
        summary: SummaryMetadata,
        options: PyramidOptions,
    ) -> Result<Self, PyramidError> {
        let geometry = summary.tile_geometry()?;
        let affine = AffineTransform::parse(&summary.affine_transform)?;
        let full_res = source
            .create_level(0, &summary)
            .await
            .map_err(PyramidError::FullResolutionUnavailable)?;

        info!(
            prefix = %summary.prefix,
            tile_width = geometry.tile_width,
            tile_height = geometry.tile_height,
            pixel_type = ?geometry.pixel_type,
            store = full_res.describe(),
            "Created pyramid"
        );

        Ok(Self {
            index: RwLock::new(CoordinateIndex::new(
                affine,
                geometry.tile_width,
                geometry.tile_height,
            )),
            ingest: Mutex::new(IngestState::default()),
            pipeline: WritePipeline::new(options.write_queue_depth),
            full_res: Arc::new(full_res),
            low_res: RwLock::new(BTreeMap::new()),
            max_level: AtomicU32::new(0),
            closing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
            read_only: false,
            source,
            summary,
            geometry,
            options,
        })
    }

    /// Open a finished pyramid for reading.
    ///
    /// Positions are rebuilt from the grid placement stored in the level 0
    /// tags. Coarser levels are discovered in order until the first missing
    /// or unreadable one.
    pub async fn open(source: S, options: PyramidOptions) -> Result<Self, PyramidError> {
        let summary = source
            .read_summary()
            .await
            .map_err(PyramidError::FullResolutionUnavailable)?;
        let geometry = summary.tile_geometry()?;
        let affine = AffineTransform::parse(&summary.affine_transform)?;
        let full_res = source
            .open_level(0)
            .await
            .and_then(|store| {
                store.ok_or_else(|| StoreError::Io("full resolution level not found".to_string()))
            })
            .map_err(PyramidError::FullResolutionUnavailable)?;

        let mut index = CoordinateIndex::new(affine, geometry.tile_width, geometry.tile_height);
        let mut extent: Option<GridExtent> = None;
        let mut seen = BTreeSet::new();
        for key in full_res.list_keys().await.map_err(PyramidError::Store)? {
            if !seen.insert(key.position) {
                continue;
            }
            let Some(tags) = full_res.get_tags(&key).await.map_err(PyramidError::Store)? else {
                continue;
            };
            index.insert_position(
                key.position,
                tags.grid_row,
                tags.grid_col,
                tags.stage_x.unwrap_or_default(),
                tags.stage_y.unwrap_or_default(),
            );
            extent
                .get_or_insert(GridExtent::single(tags.grid_row, tags.grid_col))
                .include(tags.grid_row, tags.grid_col);
        }

        let mut low_res = BTreeMap::new();
        let mut level = 1;
        loop {
            let store = match source.open_level(level).await {
                Ok(Some(store)) => store,
                Ok(None) => break,
                Err(e) => {
                    warn!(level, error = %e, "Stopping level discovery at unreadable level");
                    break;
                }
            };
            for key in store.list_keys().await.map_err(PyramidError::Store)? {
                if let Some(tags) = store.get_tags(&key).await.map_err(PyramidError::Store)? {
                    index.restore_level_position(level, key.position, tags.grid_row, tags.grid_col);
                }
            }
            low_res.insert(level, Arc::new(store));
            level += 1;
        }
        let max_level = low_res.keys().next_back().copied().unwrap_or(0);

        info!(
            prefix = %summary.prefix,
            positions = index.position_count(),
            levels = max_level + 1,
            "Opened pyramid"
        );

        Ok(Self {
            index: RwLock::new(index),
            ingest: Mutex::new(IngestState { extent }),
            pipeline: WritePipeline::new(options.write_queue_depth),
            full_res: Arc::new(full_res),
            low_res: RwLock::new(low_res),
            max_level: AtomicU32::new(max_level),
            closing: AtomicBool::new(false),
            finished: AtomicBool::new(true),
            poisoned: AtomicBool::new(false),
            read_only: true,
            source,
            summary,
            geometry,
            options,
        })
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// Register a stage location, returning its position index.
    pub async fn register_position(&self, stage_x: f64, stage_y: f64) -> u32 {
        self.index.write().await.register_position(stage_x, stage_y)
    }

    /// Register a position whose grid cell is already known.
    pub async fn register_grid_position(&self, row: i64, col: i64, stage_x: f64, stage_y: f64) -> u32 {
        self.index
            .write()
            .await
            .register_grid_position(row, col, stage_x, stage_y)
    }

    /// Full-resolution position whose tile covers a stage point.
    pub async fn position_from_stage(&self, stage_x: f64, stage_y: f64) -> Option<u32> {
        self.index.read().await.position_from_stage(stage_x, stage_y)
    }

    /// Grid cell of a full-resolution position at `level`.
    pub async fn grid_row_col(&self, position: u32, level: u32) -> Result<(i64, i64), PyramidError> {
        Ok(self.index.read().await.grid_row_col(position, level)?)
    }

    pub async fn pixel_to_stage(&self, x: i64, y: i64) -> Result<(f64, f64), PyramidError> {
        Ok(self.index.read().await.pixel_to_stage(x, y)?)
    }

    pub async fn stage_to_pixel(&self, x: f64, y: f64) -> Result<(i64, i64), PyramidError> {
        Ok(self.index.read().await.stage_to_pixel(x, y)?)
    }

    /// Grid extent of every registered position, if any.
    pub async fn grid_extent(&self) -> Option<GridExtent> {
        self.index.read().await.extent()
    }

    // =========================================================================
    // Ingest
    // =========================================================================

    /// Add one full-resolution tile and propagate it through every level.
    ///
    /// `position` must already be registered. `pixels` must be a complete
    /// level 0 tile, overlap included. The key, size and grid placement in
    /// `tags` are filled in here; other tags pass through unchanged.
    ///
    /// Returns once every resulting write has been applied.
    pub async fn ingest_tile(
        &self,
        channel: u32,
        slice: u32,
        frame: u32,
        position: u32,
        pixels: Bytes,
        tags: TileTags,
    ) -> Result<(), PyramidError> {
        if self.read_only {
            return Err(PyramidError::ReadOnly);
        }
        let expected = self.geometry.buffer_len(0);
        if pixels.len() != expected {
            return Err(PyramidError::InvalidTile {
                expected,
                actual: pixels.len(),
            });
        }

        let mut state = self.ingest.lock().await;
        if self.closing.load(Ordering::Acquire) {
            return Err(PyramidError::Closed);
        }
        if self.poisoned.load(Ordering::Acquire) {
            return Err(PyramidError::Poisoned);
        }

        let key = TileKey::new(channel, slice, frame, position);
        let result = self.ingest_locked(&mut state, key, pixels, tags).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                self.poisoned.store(true, Ordering::Release);
                error!(key = %key, error = %e, "Pyramid poisoned by fatal ingest error");
            }
        }
        result
    }

    async fn ingest_locked(
        &self,
        state: &mut IngestState,
        key: TileKey,
        pixels: Bytes,
        mut tags: TileTags,
    ) -> Result<(), PyramidError> {
        let stage = {
            let index = self.index.read().await;
            let position = index.position(key.position)?;
            (position.row, position.col, position.stage_x, position.stage_y)
        };
        let (row, col, stage_x, stage_y) = stage;

        let (width, height) = self.geometry.dimensions(0);
        tags.set_key(key);
        tags.width = width;
        tags.height = height;
        tags.set_grid(row, col);
        tags.stage_x = tags.stage_x.or(Some(stage_x));
        tags.stage_y = tags.stage_y.or(Some(stage_y));

        let mut handles = vec![
            self.pipeline
                .submit(
                    Arc::clone(&self.full_res),
                    WriteTask::CreateTile {
                        key,
                        tags: tags.clone(),
                        pixels: pixels.clone(),
                    },
                )
                .await?,
        ];

        let extent = state.extent.get_or_insert(GridExtent::single(row, col));
        extent.include(row, col);
        let required = required_max_level(
            extent.tiles_wide(),
            extent.tiles_high(),
            self.options.top_level_tiles,
        );

        // Existing levels take the tile first, so any level grown below is
        // derived from an up-to-date finer level and never needs it again
        let levels_before = self.max_resolution_level();
        let result = async {
            self.propagate(key, pixels, tags, levels_before, &mut handles)
                .await?;
            if required > levels_before {
                self.add_resolutions_up_to(required).await?;
            }
            Ok::<(), PyramidError>(())
        }
        .await;

        // Whatever happened, nothing queued for this tile may still be in flight
        let written = await_all(handles).await;
        result.and(written)
    }

    /// Fold one new level 0 tile into each coarser level up to `upto_level`,
    /// creating parents on first contribution and otherwise rewriting only
    /// the child's quadrant.
    async fn propagate(
        &self,
        key: TileKey,
        pixels: Bytes,
        tags: TileTags,
        upto_level: u32,
        handles: &mut Vec<WriteHandle>,
    ) -> Result<(), PyramidError> {
        let mut child: Vec<u8> = pixels.to_vec();
        let mut child_position = key.position;
        let mut child_tags = tags;

        for level in 1..=upto_level {
            let Some(store) = self.level_store(level).await else {
                debug!(level, "Level absent, stopping propagation");
                break;
            };

            let (parent_position, quadrant, row, col) =
                self.parent_of(level - 1, child_position).await?;
            let parent_key = key.with_position(parent_position);

            let existing = store
                .get_tile(&parent_key)
                .await
                .map_err(PyramidError::Store)?
                .filter(|tile| !tile.pixels.is_empty());

            let parent = match existing {
                Some(tile) => {
                    let mut buffer = tile.pixels.to_vec();
                    let rect = downsample(&child, &mut buffer, &self.geometry, level - 1, quadrant)?;
                    let patch = extract_rect(
                        &buffer,
                        self.geometry.tile_width,
                        self.geometry.pixel_type,
                        rect,
                    );
                    handles.push(
                        self.pipeline
                            .submit(
                                Arc::clone(&store),
                                WriteTask::OverwriteRegion {
                                    key: parent_key,
                                    rect,
                                    pixels: Bytes::from(patch),
                                },
                            )
                            .await?,
                    );
                    child_tags = tile.tags;
                    buffer
                }
                None => {
                    let mut buffer = vec![0u8; self.geometry.buffer_len(level)];
                    downsample(&child, &mut buffer, &self.geometry, level - 1, quadrant)?;
                    child_tags = child_tags.for_level(
                        parent_position,
                        self.geometry.tile_width,
                        self.geometry.tile_height,
                        row,
                        col,
                    );
                    handles.push(
                        self.pipeline
                            .submit(
                                Arc::clone(&store),
                                WriteTask::CreateTile {
                                    key: parent_key,
                                    tags: child_tags.clone(),
                                    pixels: Bytes::from(buffer.clone()),
                                },
                            )
                            .await?,
                    );
                    buffer
                }
            };

            child = parent;
            child_position = parent_position;
        }

        Ok(())
    }

    /// Grow the pyramid to `target` levels.
    ///
    /// Each new level is derived completely from the level below it before
    /// the next one is built, and only then becomes visible through
    /// [`max_resolution_level`](Self::max_resolution_level). A level whose store cannot be created is left
    /// absent and growth stops there; the next ingest retries.
    async fn add_resolutions_up_to(&self, target: u32) -> Result<(), PyramidError> {
        let current = self.max_resolution_level();
        if target <= current {
            return Ok(());
        }

        // Backfill reads the level below, so queued writes must land first
        self.pipeline.drain().await?;
        self.index.write().await.update_lower_resolution_nodes(target);

        for level in current + 1..=target {
            let store = match self.source.create_level(level, &self.summary).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(level, error = %e, "Failed to create resolution level; leaving it absent");
                    break;
                }
            };
            // Readers find the level only once it holds its whole history
            let tiles = self.backfill(level, &store).await?;
            self.low_res.write().await.insert(level, Arc::clone(&store));
            self.max_level.fetch_max(level, Ordering::AcqRel);
            info!(level, tiles, store = store.describe(), "Added resolution level");
        }

        Ok(())
    }

    /// Derive every tile of a freshly created `level` from the level below,
    /// writing each parent tile exactly once.
    async fn backfill(&self, level: u32, store: &Arc<S::Store>) -> Result<usize, PyramidError> {
        let finer = match self.level_store(level - 1).await {
            Some(finer) => finer,
            None => return Ok(0),
        };

        let mut parents: BTreeMap<TileKey, Vec<(TileKey, Quadrant)>> = BTreeMap::new();
        for child in finer.list_keys().await.map_err(PyramidError::Store)? {
            let (parent_position, quadrant, _, _) = self.parent_of(level - 1, child.position).await?;
            parents
                .entry(child.with_position(parent_position))
                .or_default()
                .push((child, quadrant));
        }

        let mut handles = Vec::with_capacity(parents.len());
        for (parent_key, children) in parents {
            let (row, col) = self
                .index
                .read()
                .await
                .level_grid(level, parent_key.position)
                .ok_or(CoordinateError::UnknownLevelPosition {
                    level,
                    index: parent_key.position,
                })?;

            let mut buffer = vec![0u8; self.geometry.buffer_len(level)];
            let mut parent_tags = None;
            for (child_key, quadrant) in children {
                let Some(tile) = finer.get_tile(&child_key).await.map_err(PyramidError::Store)? else {
                    continue;
                };
                if tile.pixels.is_empty() {
                    continue;
                }
                downsample(&tile.pixels, &mut buffer, &self.geometry, level - 1, quadrant)?;
                parent_tags.get_or_insert_with(|| {
                    tile.tags.for_level(
                        parent_key.position,
                        self.geometry.tile_width,
                        self.geometry.tile_height,
                        row,
                        col,
                    )
                });
            }

            if let Some(tags) = parent_tags {
                handles.push(
                    self.pipeline
                        .submit(
                            Arc::clone(store),
                            WriteTask::CreateTile {
                                key: parent_key,
                                tags,
                                pixels: Bytes::from(buffer),
                            },
                        )
                        .await?,
                );
            }
        }

        let written = handles.len();
        await_all(handles).await?;
        Ok(written)
    }

    /// Parent index, quadrant and parent grid cell of a tile at `level`.
    async fn parent_of(
        &self,
        level: u32,
        position: u32,
    ) -> Result<(u32, Quadrant, i64, i64), PyramidError> {
        let mut index = self.index.write().await;
        let (parent, quadrant) = index.parent_position_index(level, position)?;
        let (row, col) = index
            .level_grid(level + 1, parent)
            .ok_or(CoordinateError::UnknownLevelPosition {
                level: level + 1,
                index: parent,
            })?;
        Ok((parent, quadrant, row, col))
    }

    async fn level_store(&self, level: u32) -> Option<Arc<S::Store>> {
        if level == 0 {
            return Some(Arc::clone(&self.full_res));
        }
        self.low_res.read().await.get(&level).cloned()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a rectangle of absolute pixels at `level`.
    ///
    /// Coordinates are in the level's own pixel space, where the tile at grid
    /// cell `(row, col)` spans `[col × tile_width, (col + 1) × tile_width)`.
    /// Areas with no tile read as zero. The returned tags are those of the
    /// first tile that contributed pixels.
    #[allow(clippy::too_many_arguments)]
    pub async fn read_region(
        &self,
        channel: u32,
        slice: u32,
        frame: u32,
        level: u32,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    ) -> Result<Region, PyramidError> {
        if width == 0 || height == 0 {
            return Err(PyramidError::InvalidRegion { width, height });
        }

        let out_of_range = PyramidError::RegionOutOfRange {
            x,
            y,
            width,
            height,
        };
        let pixel_type = self.geometry.pixel_type;
        let bytes_per_pixel = pixel_type.bytes_per_pixel();
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(bytes_per_pixel))
            .ok_or_else(|| out_of_range.clone())?;
        let spans =
            plan_region(&self.geometry, level, x, y, width, height).ok_or(out_of_range)?;

        let mut data = vec![0u8; len];
        let mut tags = None;

        if let Some(store) = self.level_store(level).await {
            let positions: Vec<Option<u32>> = {
                let index = self.index.read().await;
                spans
                    .iter()
                    .map(|span| index.position_at(level, span.row, span.col))
                    .collect()
            };

            let expected = self.geometry.buffer_len(level);
            let (stored_width, _) = self.geometry.dimensions(level);

            for (span, position) in spans.iter().zip(positions) {
                let Some(position) = position else {
                    continue;
                };
                let key = TileKey::new(channel, slice, frame, position);
                let Some(tile) = store.get_tile(&key).await.map_err(PyramidError::Store)? else {
                    continue;
                };
                if tile.pixels.is_empty() {
                    continue;
                }
                if tile.pixels.len() != expected {
                    warn!(
                        level,
                        key = %key,
                        expected,
                        actual = tile.pixels.len(),
                        "Skipping tile with unexpected size"
                    );
                    continue;
                }

                copy_rect(
                    &tile.pixels,
                    stored_width,
                    span.src_x,
                    span.src_y,
                    &mut data,
                    width,
                    span.dst_x,
                    span.dst_y,
                    span.width,
                    span.height,
                    bytes_per_pixel,
                );
                tags.get_or_insert(tile.tags);
            }
        }

        Ok(Region {
            level,
            x,
            y,
            width,
            height,
            pixel_type,
            data: Bytes::from(data),
            tags,
        })
    }

    /// Fetch one stored tile. `position` is the flat index at `level`.
    pub async fn get_tile(
        &self,
        channel: u32,
        slice: u32,
        frame: u32,
        position: u32,
        level: u32,
    ) -> Result<Option<StoredTile>, PyramidError> {
        let Some(store) = self.level_store(level).await else {
            return Ok(None);
        };
        store
            .get_tile(&TileKey::new(channel, slice, frame, position))
            .await
            .map_err(PyramidError::Store)
    }

    /// Keys of every full-resolution tile.
    pub async fn tile_keys(&self) -> Result<Vec<TileKey>, PyramidError> {
        self.full_res.list_keys().await.map_err(PyramidError::Store)
    }

    /// Grid cells `(row, col)` holding full-resolution data at `slice`.
    pub async fn tiles_with_data_at(&self, slice: u32) -> Result<BTreeSet<(i64, i64)>, PyramidError> {
        let keys = self.tile_keys().await?;
        let index = self.index.read().await;
        Ok(keys
            .iter()
            .filter(|key| key.slice == slice)
            .filter_map(|key| index.level_grid(0, key.position))
            .collect())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn summary(&self) -> &SummaryMetadata {
        &self.summary
    }

    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    pub fn pixel_type(&self) -> PixelType {
        self.geometry.pixel_type
    }

    pub fn options(&self) -> &PyramidOptions {
        &self.options
    }

    pub fn max_resolution_level(&self) -> u32 {
        self.max_level.load(Ordering::Acquire)
    }

    pub fn num_res_levels(&self) -> u32 {
        self.max_resolution_level() + 1
    }

    /// Total bytes held by every level's store.
    pub async fn dataset_size(&self) -> u64 {
        let mut total = self.full_res.size_bytes().await;
        let stores: Vec<Arc<S::Store>> = self.low_res.read().await.values().cloned().collect();
        for store in stores {
            total += store.size_bytes().await;
        }
        total
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Whether every write has been applied and the stores are closed.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop accepting tiles, drain queued writes and close every store.
    ///
    /// Returns immediately; await the handle or poll
    /// [`is_finished`](Self::is_finished) to learn when it is done.
    pub fn close(self: &Arc<Self>) -> JoinHandle<Result<(), PyramidError>> {
        self.closing.store(true, Ordering::Release);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            // An ingest already past its checks finishes first
            let _ingest = this.ingest.lock().await;
            this.pipeline.shutdown().await;

            let mut stores = vec![Arc::clone(&this.full_res)];
            stores.extend(this.low_res.read().await.values().cloned());

            let mut first_error = None;
            for store in stores {
                if let Err(e) = store.close().await {
                    error!(store = store.describe(), error = %e, "Failed to close store");
                    first_error.get_or_insert(e);
                }
            }

            this.finished.store(true, Ordering::Release);
            info!(
                prefix = %this.summary.prefix,
                writes = this.pipeline.applied(),
                "Pyramid closed"
            );

            match first_error {
                Some(e) => Err(PyramidError::Store(e)),
                None => Ok(()),
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
