//! Pixel buffer helpers shared by the downsampler, the stores and region reads.
//!
//! Buffers are tightly packed rows with no padding. A buffer's width is always
//! passed explicitly because level 0 tiles are wider than the tile grid step.

use bytes::Bytes;

use crate::metadata::{PixelType, TileTags};

/// Axis-aligned pixel rectangle inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle fits inside a `width × height` buffer.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }

    /// Byte length of the rectangle's pixels.
    pub fn byte_len(&self, pixel_type: PixelType) -> usize {
        self.width as usize * self.height as usize * pixel_type.bytes_per_pixel()
    }
}

/// A rectangle of pixels read from one level of a pyramid.
#[derive(Debug, Clone)]
pub struct Region {
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,

    /// Packed pixels, `width × height` samples
    pub data: Bytes,

    /// Tags of the first tile that contributed pixels, if any did
    pub tags: Option<TileTags>,
}

// =============================================================================
// Sample Access
// =============================================================================

/// Read one color component of the pixel at `pixel` (flat index).
#[inline]
pub fn read_component(buf: &[u8], pixel_type: PixelType, pixel: usize, component: usize) -> u32 {
    match pixel_type {
        PixelType::Gray8 => buf[pixel] as u32,
        PixelType::Gray16 => u16::from_le_bytes([buf[pixel * 2], buf[pixel * 2 + 1]]) as u32,
        PixelType::Rgb32 => buf[pixel * 4 + component] as u32,
    }
}

/// Write one color component of the pixel at `pixel` (flat index).
#[inline]
pub fn write_component(
    buf: &mut [u8],
    pixel_type: PixelType,
    pixel: usize,
    component: usize,
    value: u32,
) {
    match pixel_type {
        PixelType::Gray8 => buf[pixel] = value as u8,
        PixelType::Gray16 => {
            let bytes = (value as u16).to_le_bytes();
            buf[pixel * 2] = bytes[0];
            buf[pixel * 2 + 1] = bytes[1];
        }
        PixelType::Rgb32 => buf[pixel * 4 + component] = value as u8,
    }
}

// =============================================================================
// Rectangle Copies
// =============================================================================

/// Copy a `width × height` block of pixels between two packed buffers.
#[allow(clippy::too_many_arguments)]
pub fn copy_rect(
    src: &[u8],
    src_width: u32,
    src_x: u32,
    src_y: u32,
    dst: &mut [u8],
    dst_width: u32,
    dst_x: u32,
    dst_y: u32,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) {
    let row_len = width as usize * bytes_per_pixel;
    for row in 0..height as usize {
        let src_start =
            ((src_y as usize + row) * src_width as usize + src_x as usize) * bytes_per_pixel;
        let dst_start =
            ((dst_y as usize + row) * dst_width as usize + dst_x as usize) * bytes_per_pixel;
        dst[dst_start..dst_start + row_len].copy_from_slice(&src[src_start..src_start + row_len]);
    }
}

/// Pack the pixels of `rect` out of a buffer `buf_width` pixels wide.
pub fn extract_rect(buf: &[u8], buf_width: u32, pixel_type: PixelType, rect: Rect) -> Vec<u8> {
    let mut out = vec![0u8; rect.byte_len(pixel_type)];
    copy_rect(
        buf,
        buf_width,
        rect.x,
        rect.y,
        &mut out,
        rect.width,
        0,
        0,
        rect.width,
        rect.height,
        pixel_type.bytes_per_pixel(),
    );
    out
}

/// Write packed `data` into `rect` of a buffer `buf_width` pixels wide.
pub fn patch_rect(buf: &mut [u8], buf_width: u32, pixel_type: PixelType, rect: Rect, data: &[u8]) {
    copy_rect(
        data,
        rect.width,
        0,
        0,
        buf,
        buf_width,
        rect.x,
        rect.y,
        rect.width,
        rect.height,
        pixel_type.bytes_per_pixel(),
    );
}

// =============================================================================
// 16-bit Conversion
// =============================================================================

/// Little-endian bytes of 16-bit samples.
pub fn encode_gray16(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// 16-bit samples of little-endian bytes. A trailing odd byte is ignored.
pub fn decode_gray16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
