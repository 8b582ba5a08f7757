//! JPEG preview encoder for pyramid regions.
//!
//! Regions are converted to 8-bit before encoding:
//!
//! - **Gray8**: encoded as-is.
//! - **Gray16**: scaled linearly so the brightest sample in the region maps
//!   to 255. An all-zero region stays black.
//! - **Rgb32**: the ignored fourth component is dropped.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::EncodeError;
use crate::metadata::PixelType;

use super::buffer::{decode_gray16, Region};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Region Encoder
// =============================================================================

/// Encodes raw region pixels as JPEG.
#[derive(Debug, Clone, Default)]
pub struct RegionEncoder {}

impl RegionEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode a region at the given quality (clamped to 1-100).
    pub fn encode(&self, region: &Region, quality: u8) -> Result<Bytes, EncodeError> {
        if region.width == 0 || region.height == 0 {
            return Err(EncodeError::EmptyRegion);
        }
        let image = to_image(region)?;

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, clamp_quality(quality));
        encoder
            .encode_image(&image)
            .map_err(|e| EncodeError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}

fn to_image(region: &Region) -> Result<DynamicImage, EncodeError> {
    let (width, height) = (region.width, region.height);
    let size_mismatch = || EncodeError::Encode {
        message: format!(
            "region data is {} bytes, too short for {}x{} {:?}",
            region.data.len(),
            width,
            height,
            region.pixel_type
        ),
    };

    let image = match region.pixel_type {
        PixelType::Gray8 => GrayImage::from_raw(width, height, region.data.to_vec())
            .map(DynamicImage::ImageLuma8),
        PixelType::Gray16 => {
            GrayImage::from_raw(width, height, scale_gray16(&region.data)).map(DynamicImage::ImageLuma8)
        }
        PixelType::Rgb32 => {
            let rgb: Vec<u8> = region
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
    };

    image.ok_or_else(size_mismatch)
}

/// Scale 16-bit samples to 8 bits by the maximum sample.
fn scale_gray16(bytes: &[u8]) -> Vec<u8> {
    let samples = decode_gray16(bytes);
    let max = samples.iter().copied().max().unwrap_or(0) as u32;
    if max == 0 {
        return vec![0; samples.len()];
    }
    samples
        .into_iter()
        .map(|s| ((s as u32 * 255 + max / 2) / max) as u8)
        .collect()
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
