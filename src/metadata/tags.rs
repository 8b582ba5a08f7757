//! Tile keys and per-tile tags.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Tile Key
// =============================================================================

/// Identifies one tile inside a single level's store.
///
/// `position` is the flat position index of the level the store belongs to,
/// not the full-resolution position index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub channel: u32,
    pub slice: u32,
    pub frame: u32,
    pub position: u32,
}

impl TileKey {
    pub fn new(channel: u32, slice: u32, frame: u32, position: u32) -> Self {
        Self {
            channel,
            slice,
            frame,
            position,
        }
    }

    /// Same channel/slice/frame, different position.
    pub fn with_position(self, position: u32) -> Self {
        Self { position, ..self }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.channel, self.slice, self.frame, self.position
        )
    }
}

// =============================================================================
// Tile Tags
// =============================================================================

/// Structured tags stored with every tile.
///
/// Fields the pyramid understands are typed; anything else the acquisition
/// attaches is kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TileTags {
    pub width: u32,
    pub height: u32,

    #[serde(default)]
    pub channel: u32,

    #[serde(default)]
    pub slice: u32,

    #[serde(default)]
    pub frame: u32,

    /// Flat position index at the tile's level
    #[serde(default)]
    pub position: u32,

    /// Grid row at the tile's level
    #[serde(default)]
    pub grid_row: i64,

    /// Grid column at the tile's level
    #[serde(default)]
    pub grid_col: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_x: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_y: Option<f64>,

    /// Acquisition-defined tags passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TileTags {
    /// Tags for a tile of the given key and size.
    pub fn new(key: TileKey, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channel: key.channel,
            slice: key.slice,
            frame: key.frame,
            position: key.position,
            ..Self::default()
        }
    }

    /// The key these tags describe.
    pub fn key(&self) -> TileKey {
        TileKey::new(self.channel, self.slice, self.frame, self.position)
    }

    /// Attach an acquisition-defined tag.
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Point the tags at `key`.
    pub fn set_key(&mut self, key: TileKey) {
        self.channel = key.channel;
        self.slice = key.slice;
        self.frame = key.frame;
        self.position = key.position;
    }

    /// Record the grid placement; the position name follows it.
    pub fn set_grid(&mut self, row: i64, col: i64) {
        self.grid_row = row;
        self.grid_col = col;
        self.position_name = Some(format!("Grid_{}_{}", row, col));
    }

    /// Tags for the aggregate tile a child contributes to at a coarser level.
    ///
    /// Copies everything, then rewrites size, position and grid placement. An
    /// aggregate tile has no single stage location, so stage coordinates are
    /// dropped.
    pub fn for_level(
        &self,
        position: u32,
        width: u32,
        height: u32,
        row: i64,
        col: i64,
    ) -> Self {
        let mut tags = self.clone();
        tags.width = width;
        tags.height = height;
        tags.position = position;
        tags.set_grid(row, col);
        tags.stage_x = None;
        tags.stage_y = None;
        tags
    }
}

// =============================================================================
// Tests
// =============================================================================
