use thiserror::Error;

use crate::metadata::TileKey;

/// Errors raised by a per-level tile store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Underlying filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// Persisted data could not be decoded
    #[error("Corrupt store data at {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// Summary metadata or tags could not be (de)serialized
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Tile targeted by an overwrite does not exist
    #[error("Tile not found: {0}")]
    TileNotFound(TileKey),

    /// Overwrite region does not fit inside the stored tile
    #[error("Region {x},{y} {width}x{height} exceeds tile {tile_width}x{tile_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    },

    /// Pixel payload length does not match the declared dimensions
    #[error("Pixel payload is {actual} bytes, expected {expected}")]
    PayloadSize { expected: usize, actual: usize },

    /// Store was opened for reading only
    #[error("Store is read-only: {0}")]
    ReadOnly(String),

    /// Store has been closed
    #[error("Store is closed: {0}")]
    Closed(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Metadata(err.to_string())
    }
}

/// Errors in summary metadata supplied at create time.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// Byte depth other than 1 or 2 for grayscale, or 1 for RGB
    #[error("Unsupported byte depth {byte_depth} (rgb: {rgb})")]
    UnsupportedByteDepth { byte_depth: u8, rgb: bool },

    /// Overlap leaves no pixels in the tile
    #[error("Overlap {overlap} must be smaller than tile extent {extent}")]
    OverlapTooLarge { overlap: u32, extent: u32 },

    /// Tile has zero width or height
    #[error("Tile dimensions must be non-zero, got {width}x{height}")]
    EmptyTile { width: u32, height: u32 },
}

/// Errors raised by the coordinate index.
#[derive(Debug, Clone, Error)]
pub enum CoordinateError {
    /// Position index was never registered
    #[error("Unknown position index {0}")]
    UnknownPosition(u32),

    /// Position index was never allocated at the given level
    #[error("Unknown position index {index} at level {level}")]
    UnknownLevelPosition { level: u32, index: u32 },

    /// Stage/pixel conversion needs at least one registered position
    #[error("No reference position registered")]
    NoReferencePosition,

    /// Affine transform string could not be parsed
    #[error("Invalid affine transform '{0}': expected six '_'-separated numbers")]
    InvalidAffine(String),

    /// Affine transform cannot be inverted
    #[error("Affine transform '{0}' is singular")]
    SingularAffine(String),
}

/// Errors raised by the downsample engine.
#[derive(Debug, Clone, Error)]
pub enum DownsampleError {
    /// A buffer does not have the length implied by the tile geometry
    #[error("{which} buffer is {actual} bytes, expected {expected} for level {level}")]
    BufferSize {
        which: &'static str,
        level: u32,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised by the pyramid orchestrator.
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    /// A queued write failed; the pyramid must be treated as inconsistent
    #[error("Storage write failed: {0}")]
    StorageWriteFailure(StoreError),

    /// The full-resolution store could not be created or opened
    #[error("Full resolution store unavailable: {0}")]
    FullResolutionUnavailable(StoreError),

    /// A read from a store failed
    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Coordinate error: {0}")]
    Coordinates(#[from] CoordinateError),

    /// Downsampling hit an inconsistent tile size; consistency cannot be repaired
    #[error("Downsample error: {0}")]
    Downsample(#[from] DownsampleError),

    /// Ingested pixel buffer has the wrong length
    #[error("Invalid tile: got {actual} bytes, expected {expected}")]
    InvalidTile { expected: usize, actual: usize },

    /// Region request with zero area
    #[error("Invalid region: {width}x{height}")]
    InvalidRegion { width: u32, height: u32 },

    /// Region whose far edge or buffer size does not fit in machine integers
    #[error("Region out of range: {width}x{height} at ({x}, {y})")]
    RegionOutOfRange {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    /// Ingest attempted on a pyramid opened from disk
    #[error("Pyramid is read-only")]
    ReadOnly,

    /// Ingest attempted after close
    #[error("Pyramid is closed")]
    Closed,

    /// Ingest attempted after an earlier fatal failure
    #[error("Pyramid is in a failed state after an earlier fatal error")]
    Poisoned,
}

impl PyramidError {
    /// Whether this error leaves the pyramid in an unrecoverable state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PyramidError::StorageWriteFailure(_) | PyramidError::Downsample(_)
        )
    }
}

/// Errors raised while encoding a region for preview.
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    #[error("Cannot encode an empty region")]
    EmptyRegion,

    #[error("Encode error: {message}")]
    Encode { message: String },
}

/// Errors surfaced by the HTTP region service.
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    #[error("Invalid level: {level} (pyramid has {level_count} levels)")]
    InvalidLevel { level: u32, level_count: u32 },

    #[error("Invalid quality: {quality}")]
    InvalidQuality { quality: u8 },

    #[error("Region too large: {width}x{height} exceeds {max} pixels per side")]
    RegionTooLarge { width: u32, height: u32, max: u32 },

    #[error(transparent)]
    Pyramid(#[from] PyramidError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}
