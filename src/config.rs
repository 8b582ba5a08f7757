//! Configuration management for the mosaic store CLI.
//!
//! Configuration comes from command-line arguments via clap, with every
//! option also settable through an environment variable with the `MOSAIC_`
//! prefix.
//!
//! # Commands
//!
//! - `serve` - serve previews of an acquisition over HTTP
//! - `info` - print an acquisition's metadata as JSON
//! - `export` - write one region of one level as a JPEG file
//!
//! # Environment Variables
//!
//! - `MOSAIC_DATASET` - Acquisition directory (`<root>/<prefix>_<n>`)
//! - `MOSAIC_HOST` - Server bind address (default: 0.0.0.0)
//! - `MOSAIC_PORT` - Server port (default: 3000)
//! - `MOSAIC_CACHE_REGIONS` - Region cache size in bytes (default: 64MB)
//! - `MOSAIC_MAX_REGION_SIZE` - Largest region side served (default: 4096)
//! - `MOSAIC_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `MOSAIC_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `MOSAIC_JPEG_QUALITY` - Export JPEG quality (default: 80)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pyramid::{PyramidOptions, DEFAULT_TOP_LEVEL_TILES};
use crate::raster::{is_valid_quality, DEFAULT_JPEG_QUALITY};
use crate::server::{DEFAULT_MAX_REGION_SIZE, DEFAULT_REGION_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Mosaic Store - multi-resolution storage for tiled microscopy acquisitions.
#[derive(Parser, Debug, Clone)]
#[command(name = "mosaic-store")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve region previews of an acquisition over HTTP
    Serve(ServeConfig),

    /// Print acquisition metadata as JSON
    Info(InfoConfig),

    /// Write one region of one level to a JPEG file
    Export(ExportConfig),
}

/// Options shared by every command that opens an acquisition.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Acquisition directory, e.g. `/data/mosaic_1`.
    #[arg(long, env = "MOSAIC_DATASET")]
    pub dataset: PathBuf,

    /// Number of top-level tiles the coarsest level may span per axis.
    #[arg(long, default_value_t = DEFAULT_TOP_LEVEL_TILES, env = "MOSAIC_TOP_LEVEL_TILES")]
    pub top_level_tiles: u32,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl DatasetArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.dataset.as_os_str().is_empty() {
            return Err("Dataset directory is required. Set --dataset or MOSAIC_DATASET".to_string());
        }
        if self.top_level_tiles == 0 {
            return Err("top_level_tiles must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn pyramid_options(&self) -> PyramidOptions {
        PyramidOptions {
            top_level_tiles: self.top_level_tiles,
            ..PyramidOptions::default()
        }
    }
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MOSAIC_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MOSAIC_PORT")]
    pub port: u16,

    /// Encoded region cache size in bytes.
    #[arg(long, default_value_t = DEFAULT_REGION_CACHE_CAPACITY, env = "MOSAIC_CACHE_REGIONS")]
    pub cache_regions: usize,

    /// Largest width or height a single region request may ask for.
    #[arg(long, default_value_t = DEFAULT_MAX_REGION_SIZE, env = "MOSAIC_MAX_REGION_SIZE")]
    pub max_region_size: u32,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "MOSAIC_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin if not specified.
    #[arg(long, env = "MOSAIC_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.dataset.validate()?;
        if self.cache_regions == 0 {
            return Err("cache_regions must be greater than 0".to_string());
        }
        if self.max_region_size == 0 {
            return Err("max_region_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Info
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    #[command(flatten)]
    pub dataset: DatasetArgs,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.dataset.validate()
    }
}

// =============================================================================
// Export
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Output JPEG file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Resolution level (0 = full resolution).
    #[arg(long, default_value_t = 0)]
    pub level: u32,

    /// Left edge in level pixels; may be negative.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub x: i64,

    /// Top edge in level pixels; may be negative.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub y: i64,

    #[arg(long)]
    pub width: u32,

    #[arg(long)]
    pub height: u32,

    #[arg(long, default_value_t = 0)]
    pub channel: u32,

    #[arg(long, default_value_t = 0)]
    pub slice: u32,

    #[arg(long, default_value_t = 0)]
    pub frame: u32,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "MOSAIC_JPEG_QUALITY")]
    pub quality: u8,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.dataset.validate()?;
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
