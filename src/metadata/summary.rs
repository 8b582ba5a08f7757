//! Summary metadata and the tile geometry derived from it.

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// Default affine transform: one stage unit per pixel, no rotation.
pub const IDENTITY_AFFINE: &str = "1_0_0_1_0_0";

// =============================================================================
// Pixel Type
// =============================================================================

/// Sample layout of every pixel buffer in a pyramid.
///
/// The set is closed: 8-bit gray, 16-bit gray (little-endian), and 8-bit RGB
/// stored as four interleaved components where the fourth is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelType {
    Gray8,
    Gray16,
    Rgb32,
}

impl PixelType {
    /// Resolve the pixel type from summary metadata fields.
    pub fn from_depth(byte_depth: u8, rgb: bool) -> Result<Self, MetadataError> {
        match (byte_depth, rgb) {
            (1, false) => Ok(PixelType::Gray8),
            (2, false) => Ok(PixelType::Gray16),
            (1, true) | (4, true) => Ok(PixelType::Rgb32),
            _ => Err(MetadataError::UnsupportedByteDepth { byte_depth, rgb }),
        }
    }

    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::Gray8 => 1,
            PixelType::Gray16 => 2,
            PixelType::Rgb32 => 4,
        }
    }

    /// Number of averaged color components (alpha excluded).
    pub fn components(self) -> usize {
        match self {
            PixelType::Gray8 | PixelType::Gray16 => 1,
            PixelType::Rgb32 => 3,
        }
    }
}

// =============================================================================
// Tile Geometry
// =============================================================================

/// Tile dimensions shared by every level of a pyramid.
///
/// `tile_width`/`tile_height` exclude overlap. Level 0 tiles additionally
/// carry `overlap_x`/`overlap_y` border pixels, split evenly on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub tile_width: u32,
    pub tile_height: u32,
    pub overlap_x: u32,
    pub overlap_y: u32,
    pub pixel_type: PixelType,
}

impl TileGeometry {
    /// Stored pixel dimensions of a tile at `level`.
    pub fn dimensions(&self, level: u32) -> (u32, u32) {
        if level == 0 {
            (
                self.tile_width + self.overlap_x,
                self.tile_height + self.overlap_y,
            )
        } else {
            (self.tile_width, self.tile_height)
        }
    }

    /// Byte length of a tile buffer at `level`.
    pub fn buffer_len(&self, level: u32) -> usize {
        let (width, height) = self.dimensions(level);
        width as usize * height as usize * self.pixel_type.bytes_per_pixel()
    }

    /// Offset of the first non-overlap pixel inside a stored tile.
    pub fn overlap_offset(&self, level: u32) -> (u32, u32) {
        if level == 0 {
            (self.overlap_x / 2, self.overlap_y / 2)
        } else {
            (0, 0)
        }
    }
}

// =============================================================================
// Summary Metadata
// =============================================================================

/// Acquisition-wide metadata, immutable for the lifetime of a pyramid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    /// Acquisition name; the dataset directory is `<prefix>_<n>`
    pub prefix: String,

    /// Stored tile width at this level (level 0 includes overlap)
    pub width: u32,

    /// Stored tile height at this level (level 0 includes overlap)
    pub height: u32,

    #[serde(default)]
    pub pixel_overlap_x: u32,

    #[serde(default)]
    pub pixel_overlap_y: u32,

    /// 1 or 2 for grayscale; RGB data is always one byte per component
    pub byte_depth: u8,

    #[serde(default)]
    pub rgb: bool,

    #[serde(default = "default_pixel_size")]
    pub pixel_size_um: f64,

    #[serde(default)]
    pub z_step_um: f64,

    /// Pixel-to-stage transform, `m00_m10_m01_m11_m02_m12`
    #[serde(default = "default_affine")]
    pub affine_transform: String,

    /// Planned grid size, if the acquisition declared one up front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_rows: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_cols: Option<u32>,
}

fn default_pixel_size() -> f64 {
    1.0
}

fn default_affine() -> String {
    IDENTITY_AFFINE.to_string()
}

impl SummaryMetadata {
    /// Create summary metadata for a new acquisition with no overlap.
    pub fn new(prefix: impl Into<String>, width: u32, height: u32, pixel_type: PixelType) -> Self {
        let (byte_depth, rgb) = match pixel_type {
            PixelType::Gray8 => (1, false),
            PixelType::Gray16 => (2, false),
            PixelType::Rgb32 => (1, true),
        };
        Self {
            prefix: prefix.into(),
            width,
            height,
            pixel_overlap_x: 0,
            pixel_overlap_y: 0,
            byte_depth,
            rgb,
            pixel_size_um: default_pixel_size(),
            z_step_um: 0.0,
            affine_transform: default_affine(),
            grid_rows: None,
            grid_cols: None,
        }
    }

    /// Set the overlap between adjacent stage tiles.
    pub fn with_overlap(mut self, overlap_x: u32, overlap_y: u32) -> Self {
        self.pixel_overlap_x = overlap_x;
        self.pixel_overlap_y = overlap_y;
        self
    }

    /// Set the pixel-to-stage affine transform string.
    pub fn with_affine(mut self, affine: impl Into<String>) -> Self {
        self.affine_transform = affine.into();
        self
    }

    /// Set the physical pixel size.
    pub fn with_pixel_size(mut self, pixel_size_um: f64) -> Self {
        self.pixel_size_um = pixel_size_um;
        self
    }

    pub fn pixel_type(&self) -> Result<PixelType, MetadataError> {
        PixelType::from_depth(self.byte_depth, self.rgb)
    }

    /// Derive the tile geometry, validating the summary on the way.
    pub fn tile_geometry(&self) -> Result<TileGeometry, MetadataError> {
        let pixel_type = self.pixel_type()?;

        if self.width == 0 || self.height == 0 {
            return Err(MetadataError::EmptyTile {
                width: self.width,
                height: self.height,
            });
        }
        if self.pixel_overlap_x >= self.width {
            return Err(MetadataError::OverlapTooLarge {
                overlap: self.pixel_overlap_x,
                extent: self.width,
            });
        }
        if self.pixel_overlap_y >= self.height {
            return Err(MetadataError::OverlapTooLarge {
                overlap: self.pixel_overlap_y,
                extent: self.height,
            });
        }

        Ok(TileGeometry {
            tile_width: self.width - self.pixel_overlap_x,
            tile_height: self.height - self.pixel_overlap_y,
            overlap_x: self.pixel_overlap_x,
            overlap_y: self.pixel_overlap_y,
            pixel_type,
        })
    }

    /// Summary as stored alongside a downsampled level: tiles there carry no
    /// overlap, so width and height shrink to the overlap-free tile size.
    pub fn for_downsampled_level(&self) -> Self {
        let mut summary = self.clone();
        summary.width = self.width.saturating_sub(self.pixel_overlap_x);
        summary.height = self.height.saturating_sub(self.pixel_overlap_y);
        summary
    }
}

// =============================================================================
// Tests
// =============================================================================
