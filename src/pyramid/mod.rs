//! Multi-resolution pyramid over per-level tile stores.
//!
//! # Ingest
//!
//! ```text
//!  ingest_tile(position, pixels)
//!     │
//!     ├─ 1. level 0 CreateTile ───────────────────────────► pipeline
//!     ├─ 2. for each existing level 1..=max:
//!     │       read parent, downsample child into its quadrant,
//!     │       CreateTile or OverwriteRegion ──────────────► pipeline
//!     ├─ 3. if the mosaic outgrew the pyramid:
//!     │       drain, create each new level, backfill it
//!     │       from the level below ───────────────────────► pipeline
//!     └─ 4. await every handle
//! ```
//!
//! # Reads
//!
//! `read_region` maps a pixel rectangle onto the level's tile grid, fetches
//! each covering tile and stitches the overlap-free parts together. Cells
//! without a tile read as zero.

mod region;
mod storage;

pub use region::{plan_region, TileSpan};
pub use storage::{required_max_level, PyramidOptions, PyramidStorage, DEFAULT_TOP_LEVEL_TILES};
