//! 2×2 box-filter downsampling of one child tile into its parent.
//!
//! A parent tile at level `R + 1` covers four children at level `R`. Each
//! child fills one quadrant of the parent:
//!
//! ```text
//!   parent (tile_width × tile_height)
//!  +-----------+-----------+
//!  | q=(0,0)   | q=(1,0)   |
//!  |           |           |
//!  +-----------+-----------+
//!  | q=(0,1)   | q=(1,1)   |
//!  |           |           |
//!  +-----------+-----------+
//! ```
//!
//! Only the overlap-free `tile_width × tile_height` area of the child is
//! sampled; at level 0 it starts `overlap/2` pixels into the stored tile.

use crate::coords::Quadrant;
use crate::error::DownsampleError;
use crate::metadata::TileGeometry;

use super::buffer::{read_component, write_component, Rect};

/// Average one child tile into its quadrant of `parent`.
///
/// `child` is a full stored tile at `child_level`; `parent` is a full tile at
/// `child_level + 1` and is modified in place. Returns the rectangle of the
/// parent that was written.
///
/// Each output pixel averages the 2×2 block at `(x, y)` in the child, clipped
/// at the right and bottom edges of the tile area, so odd tile dimensions
/// average one to three samples along those edges. Components are averaged
/// independently and rounded half up.
pub fn downsample(
    child: &[u8],
    parent: &mut [u8],
    geometry: &TileGeometry,
    child_level: u32,
    quadrant: Quadrant,
) -> Result<Rect, DownsampleError> {
    let expected_child = geometry.buffer_len(child_level);
    if child.len() != expected_child {
        return Err(DownsampleError::BufferSize {
            which: "child",
            level: child_level,
            expected: expected_child,
            actual: child.len(),
        });
    }
    let expected_parent = geometry.buffer_len(child_level + 1);
    if parent.len() != expected_parent {
        return Err(DownsampleError::BufferSize {
            which: "parent",
            level: child_level + 1,
            expected: expected_parent,
            actual: parent.len(),
        });
    }

    let pixel_type = geometry.pixel_type;
    let components = pixel_type.components();
    let tile_width = geometry.tile_width as usize;
    let tile_height = geometry.tile_height as usize;
    let (child_stride, _) = geometry.dimensions(child_level);
    let child_stride = child_stride as usize;
    let (offset_x, offset_y) = geometry.overlap_offset(child_level);
    let (offset_x, offset_y) = (offset_x as usize, offset_y as usize);
    let (qx, qy) = (quadrant.x as usize, quadrant.y as usize);

    let mut min = (usize::MAX, usize::MAX);
    let mut max = (0usize, 0usize);

    for y in (0..tile_height).step_by(2) {
        let has_below = y + 1 < tile_height;
        for x in (0..tile_width).step_by(2) {
            let has_right = x + 1 < tile_width;

            let top_left = (y + offset_y) * child_stride + x + offset_x;
            let mut samples = [top_left; 4];
            let mut count = 1;
            if has_right {
                samples[count] = top_left + 1;
                count += 1;
            }
            if has_below {
                samples[count] = top_left + child_stride;
                count += 1;
            }
            if has_right && has_below {
                samples[count] = top_left + child_stride + 1;
                count += 1;
            }

            let out_x = (x + qx * tile_width) / 2;
            let out_y = (y + qy * tile_height) / 2;
            let out = out_y * tile_width + out_x;

            for component in 0..components {
                let sum: u32 = samples[..count]
                    .iter()
                    .map(|&pixel| read_component(child, pixel_type, pixel, component))
                    .sum();
                let count = count as u32;
                write_component(parent, pixel_type, out, component, (sum + count / 2) / count);
            }

            min = (min.0.min(out_x), min.1.min(out_y));
            max = (max.0.max(out_x), max.1.max(out_y));
        }
    }

    Ok(Rect::new(
        min.0 as u32,
        min.1 as u32,
        (max.0 - min.0 + 1) as u32,
        (max.1 - min.1 + 1) as u32,
    ))
}

// =============================================================================
// Tests
// =============================================================================
