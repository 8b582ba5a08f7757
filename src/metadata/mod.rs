//! Acquisition metadata.
//!
//! Two records travel with every pyramid:
//!
//! - [`SummaryMetadata`]: read once when a pyramid is created or opened and
//!   immutable afterwards. It fixes the tile geometry, the pixel type and the
//!   stage affine transform.
//! - [`TileTags`]: stored next to every tile. The pyramid fills in the grid
//!   placement fields and passes everything else through untouched.

mod summary;
mod tags;

pub use summary::{PixelType, SummaryMetadata, TileGeometry};
pub use tags::{TileKey, TileTags};
