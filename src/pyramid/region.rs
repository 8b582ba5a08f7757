//! Planning which tiles a region read touches.

use crate::metadata::TileGeometry;

/// The part of one tile that lands in a region read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    pub row: i64,
    pub col: i64,

    /// Top-left of the copied block inside the stored tile
    pub src_x: u32,
    pub src_y: u32,

    /// Top-left of the copied block inside the region
    pub dst_x: u32,
    pub dst_y: u32,

    pub width: u32,
    pub height: u32,
}

/// Split a region at `level` into per-tile blocks, columns outer, rows inner.
///
/// `(x, y)` is in absolute level pixels and may be negative; tiles are found
/// with floor division. Source offsets include the overlap border at level 0.
///
/// Returns `None` when the region's far edge does not fit in an `i64`.
pub fn plan_region(
    geometry: &TileGeometry,
    level: u32,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
) -> Option<Vec<TileSpan>> {
    let tile_width = geometry.tile_width as i64;
    let tile_height = geometry.tile_height as i64;
    let (offset_x, offset_y) = geometry.overlap_offset(level);
    let x_end = x.checked_add(width as i64)?;
    let y_end = y.checked_add(height as i64)?;

    let mut spans = Vec::new();
    if width == 0 || height == 0 {
        return Some(spans);
    }

    for col in x.div_euclid(tile_width)..=(x_end - 1).div_euclid(tile_width) {
        let tile_x = col * tile_width;
        let left = x.max(tile_x);
        let right = x_end.min(tile_x.saturating_add(tile_width));

        for row in y.div_euclid(tile_height)..=(y_end - 1).div_euclid(tile_height) {
            let tile_y = row * tile_height;
            let top = y.max(tile_y);
            let bottom = y_end.min(tile_y.saturating_add(tile_height));

            spans.push(TileSpan {
                row,
                col,
                src_x: (left - tile_x) as u32 + offset_x,
                src_y: (top - tile_y) as u32 + offset_y,
                dst_x: (left - x) as u32,
                dst_y: (top - y) as u32,
                width: (right - left) as u32,
                height: (bottom - top) as u32,
            });
        }
    }

    Some(spans)
}
