//! Pixel buffers, downsampling and preview encoding.

pub mod buffer;
mod downsample;
mod encoder;

pub use buffer::{Rect, Region};
pub use downsample::downsample;
pub use encoder::{
    clamp_quality, is_valid_quality, RegionEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
