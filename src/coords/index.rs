//! Position table and per-level tile grids.

use std::collections::{BTreeMap, HashMap};

use crate::error::CoordinateError;

use super::affine::AffineTransform;

// =============================================================================
// Grid Types
// =============================================================================

/// Which child slot of its parent a tile occupies: `x` is the column parity,
/// `y` the row parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quadrant {
    pub x: u32,
    pub y: u32,
}

impl Quadrant {
    /// Quadrant of a `(row, col)` cell within its parent cell.
    pub fn of(row: i64, col: i64) -> Self {
        Self {
            x: col.rem_euclid(2) as u32,
            y: row.rem_euclid(2) as u32,
        }
    }
}

/// Parent cell of `(row, col)` one level up, flooring toward negative infinity.
pub fn parent_cell(row: i64, col: i64) -> (i64, i64) {
    (row.div_euclid(2), col.div_euclid(2))
}

/// A full-resolution stage position and its grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePosition {
    pub stage_x: f64,
    pub stage_y: f64,
    pub row: i64,
    pub col: i64,
}

/// Bounding box of grid cells, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridExtent {
    pub min_row: i64,
    pub max_row: i64,
    pub min_col: i64,
    pub max_col: i64,
}

impl GridExtent {
    pub fn single(row: i64, col: i64) -> Self {
        Self {
            min_row: row,
            max_row: row,
            min_col: col,
            max_col: col,
        }
    }

    /// Grow to include `(row, col)`.
    pub fn include(&mut self, row: i64, col: i64) {
        self.min_row = self.min_row.min(row);
        self.max_row = self.max_row.max(row);
        self.min_col = self.min_col.min(col);
        self.max_col = self.max_col.max(col);
    }

    pub fn tiles_wide(&self) -> u64 {
        (self.max_col - self.min_col + 1) as u64
    }

    pub fn tiles_high(&self) -> u64 {
        (self.max_row - self.min_row + 1) as u64
    }
}

/// Flat index <-> cell mapping for one level.
#[derive(Debug, Default, Clone)]
struct LevelGrid {
    cells: HashMap<u32, (i64, i64)>,
    by_cell: HashMap<(i64, i64), u32>,
    next: u32,
}

impl LevelGrid {
    fn get_or_insert(&mut self, cell: (i64, i64)) -> u32 {
        if let Some(&index) = self.by_cell.get(&cell) {
            return index;
        }
        let index = self.next;
        self.insert_at(index, cell);
        index
    }

    fn insert_at(&mut self, index: u32, cell: (i64, i64)) {
        self.cells.insert(index, cell);
        self.by_cell.insert(cell, index);
        self.next = self.next.max(index + 1);
    }
}

// =============================================================================
// Coordinate Index
// =============================================================================

/// Maps stage positions onto an unbounded tile grid at every level.
///
/// Level 0 indices are the full-resolution position indices used by the
/// acquisition. Coarser levels get their own flat indices, allocated the
/// first time a cell is needed, because each level's store is addressed by a
/// flat position index rather than by `(row, col)`.
#[derive(Debug, Clone)]
pub struct CoordinateIndex {
    affine: AffineTransform,
    tile_width: u32,
    tile_height: u32,
    positions: BTreeMap<u32, StagePosition>,
    levels: Vec<LevelGrid>,
}

impl CoordinateIndex {
    /// Create an empty index.
    ///
    /// `tile_width`/`tile_height` are the overlap-free tile dimensions, which
    /// are also the stage step between adjacent positions in pixels.
    pub fn new(affine: AffineTransform, tile_width: u32, tile_height: u32) -> Self {
        Self {
            affine,
            tile_width,
            tile_height,
            positions: BTreeMap::new(),
            levels: vec![LevelGrid::default()],
        }
    }

    pub fn affine(&self) -> &AffineTransform {
        &self.affine
    }

    /// Number of registered full-resolution positions.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Register a stage location and return its position index.
    ///
    /// The first position anchors the grid at `(0, 0)`. Later positions are
    /// placed by rounding their stage offset from that anchor to whole tile
    /// steps, so stage points within half a step of an existing cell resolve
    /// to that cell's index.
    pub fn register_position(&mut self, stage_x: f64, stage_y: f64) -> u32 {
        let (row, col) = match self.reference() {
            None => (0, 0),
            Some(reference) => {
                let (dx, dy) = self
                    .affine
                    .stage_to_pixel_delta(stage_x - reference.stage_x, stage_y - reference.stage_y);
                (
                    reference.row + (dy / self.tile_height as f64).round() as i64,
                    reference.col + (dx / self.tile_width as f64).round() as i64,
                )
            }
        };
        self.register_grid_position(row, col, stage_x, stage_y)
    }

    /// Register a position whose grid cell is already known.
    ///
    /// Returns the existing index if the cell is taken.
    pub fn register_grid_position(&mut self, row: i64, col: i64, stage_x: f64, stage_y: f64) -> u32 {
        if let Some(&index) = self.levels[0].by_cell.get(&(row, col)) {
            return index;
        }
        let index = self.levels[0].next;
        self.insert_position(index, row, col, stage_x, stage_y);
        index
    }

    /// Insert a position under a fixed index, as when rebuilding from disk.
    pub fn insert_position(&mut self, index: u32, row: i64, col: i64, stage_x: f64, stage_y: f64) {
        self.positions.insert(
            index,
            StagePosition {
                stage_x,
                stage_y,
                row,
                col,
            },
        );
        self.levels[0].insert_at(index, (row, col));
    }

    /// Record a coarser level's existing index for a cell, as found on disk.
    pub fn restore_level_position(&mut self, level: u32, index: u32, row: i64, col: i64) {
        self.ensure_level(level);
        self.levels[level as usize].insert_at(index, (row, col));
    }

    /// Look up a registered full-resolution position.
    pub fn position(&self, index: u32) -> Result<&StagePosition, CoordinateError> {
        self.positions
            .get(&index)
            .ok_or(CoordinateError::UnknownPosition(index))
    }

    /// Grid cell of a full-resolution position at `level`.
    pub fn grid_row_col(&self, index: u32, level: u32) -> Result<(i64, i64), CoordinateError> {
        let position = self.position(index)?;
        let mut cell = (position.row, position.col);
        for _ in 0..level {
            cell = parent_cell(cell.0, cell.1);
        }
        Ok(cell)
    }

    /// Flat index at `level` of the aggregate tile covering a full-resolution
    /// position, allocated on first use.
    pub fn level_position_index(&mut self, index: u32, level: u32) -> Result<u32, CoordinateError> {
        let cell = self.grid_row_col(index, level)?;
        self.ensure_level(level);
        Ok(self.levels[level as usize].get_or_insert(cell))
    }

    /// Parent index one level up of a tile at `level`, plus its quadrant.
    pub fn parent_position_index(
        &mut self,
        level: u32,
        index: u32,
    ) -> Result<(u32, Quadrant), CoordinateError> {
        let (row, col) = self
            .level_grid(level, index)
            .ok_or(CoordinateError::UnknownLevelPosition { level, index })?;
        self.ensure_level(level + 1);
        let parent = self.levels[level as usize + 1].get_or_insert(parent_cell(row, col));
        Ok((parent, Quadrant::of(row, col)))
    }

    /// Cell of a flat index at `level`.
    pub fn level_grid(&self, level: u32, index: u32) -> Option<(i64, i64)> {
        self.levels
            .get(level as usize)
            .and_then(|grid| grid.cells.get(&index))
            .copied()
    }

    /// Flat index at `level` for a cell, if one has been allocated.
    pub fn position_at(&self, level: u32, row: i64, col: i64) -> Option<u32> {
        self.levels
            .get(level as usize)
            .and_then(|grid| grid.by_cell.get(&(row, col)))
            .copied()
    }

    /// Make sure every full-resolution position has an index at every level
    /// up to `upto_level`.
    pub fn update_lower_resolution_nodes(&mut self, upto_level: u32) {
        self.ensure_level(upto_level);
        let mut cells: Vec<(i64, i64)> = self
            .positions
            .values()
            .map(|position| (position.row, position.col))
            .collect();
        for level in 1..=upto_level as usize {
            for cell in &mut cells {
                *cell = parent_cell(cell.0, cell.1);
                self.levels[level].get_or_insert(*cell);
            }
        }
    }

    /// Bounding box of every registered position, if any.
    pub fn extent(&self) -> Option<GridExtent> {
        let mut iter = self.positions.values();
        let first = iter.next()?;
        let mut extent = GridExtent::single(first.row, first.col);
        for position in iter {
            extent.include(position.row, position.col);
        }
        Some(extent)
    }

    /// Absolute full-resolution pixel coordinates of a stage point.
    pub fn stage_to_pixel(&self, stage_x: f64, stage_y: f64) -> Result<(i64, i64), CoordinateError> {
        let reference = self.reference().ok_or(CoordinateError::NoReferencePosition)?;
        let (cx, cy) = self.tile_center(reference);
        let (dx, dy) = self
            .affine
            .stage_to_pixel_delta(stage_x - reference.stage_x, stage_y - reference.stage_y);
        Ok(((cx + dx).round() as i64, (cy + dy).round() as i64))
    }

    /// Stage coordinates of an absolute full-resolution pixel.
    pub fn pixel_to_stage(&self, x: i64, y: i64) -> Result<(f64, f64), CoordinateError> {
        let reference = self.reference().ok_or(CoordinateError::NoReferencePosition)?;
        let (cx, cy) = self.tile_center(reference);
        let (dx, dy) = self.affine.pixel_to_stage_delta(x as f64 - cx, y as f64 - cy);
        Ok((reference.stage_x + dx, reference.stage_y + dy))
    }

    /// Full-resolution position whose tile covers a stage point.
    pub fn position_from_stage(&self, stage_x: f64, stage_y: f64) -> Option<u32> {
        let (x, y) = self.stage_to_pixel(stage_x, stage_y).ok()?;
        let row = y.div_euclid(self.tile_height as i64);
        let col = x.div_euclid(self.tile_width as i64);
        self.position_at(0, row, col)
    }

    fn reference(&self) -> Option<&StagePosition> {
        self.positions.values().next()
    }

    fn tile_center(&self, position: &StagePosition) -> (f64, f64) {
        (
            position.col as f64 * self.tile_width as f64 + self.tile_width as f64 / 2.0,
            position.row as f64 * self.tile_height as f64 + self.tile_height as f64 / 2.0,
        )
    }

    fn ensure_level(&mut self, level: u32) {
        while self.levels.len() <= level as usize {
            self.levels.push(LevelGrid::default());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
