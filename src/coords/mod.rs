//! Stage-to-grid coordinate mapping.
//!
//! Positions live on an unbounded signed grid. Each coarser level halves the
//! grid with floor division, so four sibling cells share one parent:
//!
//! ```text
//! level 0:  (-1,-1) (-1, 0)        level 1:  (-1,-1) (-1, 0)
//!           ( 0,-1) ( 0, 0)  --->
//!           ( 1,-1) ( 1, 0)                  ( 0,-1) ( 0, 0)
//! ```

mod affine;
mod index;

pub use affine::AffineTransform;
pub use index::{parent_cell, CoordinateIndex, GridExtent, Quadrant, StagePosition};
