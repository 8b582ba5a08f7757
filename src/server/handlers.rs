//! HTTP request handlers for the region API.
//!
//! # Endpoints
//!
//! - `GET /region/{level}/{x}/{y}/{width}/{height}.jpg` - Stitched region as JPEG
//! - `GET /info` - Pyramid metadata
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{PyramidError, RegionError};
use crate::metadata::PixelType;
use crate::pyramid::PyramidStorage;
use crate::raster::{is_valid_quality, RegionEncoder, DEFAULT_JPEG_QUALITY};
use crate::store::StoreSource;

use super::cache::{RegionCache, RegionCacheKey};

/// Default largest region side served, in pixels.
pub const DEFAULT_MAX_REGION_SIZE: u32 = 4096;

// =============================================================================
// Application State
// =============================================================================

/// Shared state handed to every handler.
pub struct AppState<S: StoreSource + 'static> {
    pub pyramid: Arc<PyramidStorage<S>>,
    pub cache: Arc<RegionCache>,
    pub encoder: RegionEncoder,

    /// Cache-Control max-age for regions of a finished pyramid
    pub cache_max_age: u32,

    /// Largest width or height a single request may ask for
    pub max_region_size: u32,
}

impl<S: StoreSource + 'static> AppState<S> {
    pub fn new(pyramid: Arc<PyramidStorage<S>>) -> Self {
        Self {
            pyramid,
            cache: Arc::new(RegionCache::new()),
            encoder: RegionEncoder::new(),
            cache_max_age: 3600,
            max_region_size: DEFAULT_MAX_REGION_SIZE,
        }
    }

    pub fn with_cache(mut self, cache: RegionCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_max_region_size(mut self, max_region_size: u32) -> Self {
        self.max_region_size = max_region_size;
        self
    }
}

impl<S: StoreSource + 'static> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            pyramid: Arc::clone(&self.pyramid),
            cache: Arc::clone(&self.cache),
            encoder: self.encoder.clone(),
            cache_max_age: self.cache_max_age,
            max_region_size: self.max_region_size,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for region requests.
///
/// Extracted from: `/region/{level}/{x}/{y}/{width}/{filename}`
/// where filename is `{height}` or `{height}.jpg`
#[derive(Debug, Deserialize)]
pub struct RegionPathParams {
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub filename: String,
}

impl RegionPathParams {
    /// Parse the height from the filename, stripping any .jpg extension.
    pub fn height(&self) -> Result<u32, std::num::ParseIntError> {
        let height = self.filename.strip_suffix(".jpg").unwrap_or(&self.filename);
        height.parse()
    }
}

/// Query parameters for region requests.
#[derive(Debug, Deserialize)]
pub struct RegionQueryParams {
    #[serde(default)]
    pub channel: u32,

    #[serde(default)]
    pub slice: u32,

    #[serde(default)]
    pub frame: u32,

    /// JPEG quality (1-100, defaults to 80)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_level")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Grid bounds of the acquired positions.
#[derive(Debug, Serialize)]
pub struct GridExtentResponse {
    pub min_row: i64,
    pub max_row: i64,
    pub min_col: i64,
    pub max_col: i64,
    pub tiles_wide: u64,
    pub tiles_high: u64,
}

/// Response from the info endpoint.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub prefix: String,
    pub pixel_type: PixelType,
    pub tile_width: u32,
    pub tile_height: u32,
    pub overlap_x: u32,
    pub overlap_y: u32,
    pub pixel_size_um: f64,
    pub affine_transform: String,
    pub level_count: u32,

    /// Whether ingestion has ended; regions of a finished pyramid are cacheable
    pub finished: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridExtentResponse>,

    pub dataset_size: u64,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Client errors are logged at WARN, server errors at ERROR.
impl IntoResponse for RegionError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            RegionError::InvalidLevel { .. } => (StatusCode::BAD_REQUEST, "invalid_level"),
            RegionError::InvalidQuality { .. } => (StatusCode::BAD_REQUEST, "invalid_quality"),
            RegionError::RegionTooLarge { .. } => (StatusCode::BAD_REQUEST, "region_too_large"),
            RegionError::Pyramid(
                PyramidError::InvalidRegion { .. } | PyramidError::RegionOutOfRange { .. },
            ) => (StatusCode::BAD_REQUEST, "invalid_region"),
            RegionError::Pyramid(PyramidError::Closed) => {
                (StatusCode::SERVICE_UNAVAILABLE, "closed")
            }
            RegionError::Pyramid(PyramidError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            RegionError::Pyramid(_) => (StatusCode::INTERNAL_SERVER_ERROR, "pyramid_error"),
            RegionError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        };

        let message = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = error_type, "{}", message);
        } else {
            warn!(status = status.as_u16(), error = error_type, "{}", message);
        }

        (
            status,
            Json(ErrorResponse::with_status(error_type, message, status)),
        )
            .into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle region requests.
///
/// # Endpoint
///
/// `GET /region/{level}/{x}/{y}/{width}/{height}.jpg`
///
/// # Query Parameters
///
/// - `channel`, `slice`, `frame`: tile key components (default: 0)
/// - `quality`: JPEG quality 1-100 (default: 80)
///
/// # Headers
///
/// - `Content-Type: image/jpeg`
/// - `Cache-Control`: `public, max-age=...` once the pyramid is finished,
///   `no-store` while it is still being acquired
/// - `X-Region-Cache-Hit: true|false`
pub async fn region_handler<S: StoreSource + 'static>(
    State(state): State<AppState<S>>,
    Path(params): Path<RegionPathParams>,
    Query(query): Query<RegionQueryParams>,
) -> Result<Response, RegionError> {
    let height = params.height().map_err(|_| {
        RegionError::Pyramid(PyramidError::InvalidRegion {
            width: params.width,
            height: 0,
        })
    })?;

    let level_count = state.pyramid.num_res_levels();
    if params.level >= level_count {
        return Err(RegionError::InvalidLevel {
            level: params.level,
            level_count,
        });
    }
    if !is_valid_quality(query.quality) {
        return Err(RegionError::InvalidQuality {
            quality: query.quality,
        });
    }
    if params.width > state.max_region_size || height > state.max_region_size {
        return Err(RegionError::RegionTooLarge {
            width: params.width,
            height,
            max: state.max_region_size,
        });
    }

    let key = RegionCacheKey {
        channel: query.channel,
        slice: query.slice,
        frame: query.frame,
        level: params.level,
        x: params.x,
        y: params.y,
        width: params.width,
        height,
        quality: query.quality,
    };

    let finished = state.pyramid.is_finished();
    if finished {
        if let Some(cached) = state.cache.get(&key).await {
            debug!(?key, "Region cache hit");
            return Ok(jpeg_response(cached, true, Some(state.cache_max_age)));
        }
    }

    let region = state
        .pyramid
        .read_region(
            query.channel,
            query.slice,
            query.frame,
            params.level,
            params.x,
            params.y,
            params.width,
            height,
        )
        .await?;
    let jpeg = state.encoder.encode(&region, query.quality)?;

    if finished {
        state.cache.put(key, jpeg.clone()).await;
        Ok(jpeg_response(jpeg, false, Some(state.cache_max_age)))
    } else {
        Ok(jpeg_response(jpeg, false, None))
    }
}

fn jpeg_response(data: bytes::Bytes, cache_hit: bool, max_age: Option<u32>) -> Response {
    let cache_control = match max_age {
        Some(age) => format!("public, max-age={}", age),
        None => "no-store".to_string(),
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CACHE_CONTROL, cache_control),
            (
                header::HeaderName::from_static("x-region-cache-hit"),
                cache_hit.to_string(),
            ),
        ],
        data,
    )
        .into_response()
}

/// Handle pyramid metadata requests.
pub async fn info_handler<S: StoreSource + 'static>(
    State(state): State<AppState<S>>,
) -> Json<InfoResponse> {
    let pyramid = &state.pyramid;
    let summary = pyramid.summary();
    let geometry = pyramid.geometry();

    let grid = pyramid.grid_extent().await.map(|extent| GridExtentResponse {
        min_row: extent.min_row,
        max_row: extent.max_row,
        min_col: extent.min_col,
        max_col: extent.max_col,
        tiles_wide: extent.tiles_wide(),
        tiles_high: extent.tiles_high(),
    });

    Json(InfoResponse {
        prefix: summary.prefix.clone(),
        pixel_type: geometry.pixel_type,
        tile_width: geometry.tile_width,
        tile_height: geometry.tile_height,
        overlap_x: geometry.overlap_x,
        overlap_y: geometry.overlap_y,
        pixel_size_um: summary.pixel_size_um,
        affine_transform: summary.affine_transform.clone(),
        level_count: pyramid.num_res_levels(),
        finished: pyramid.is_finished(),
        grid,
        dataset_size: pyramid.dataset_size().await,
    })
}

/// Handle health check requests.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EncodeError, StoreError};

    #[test]
    fn test_region_path_height() {
        let params = RegionPathParams {
            level: 0,
            x: -5,
            y: 0,
            width: 10,
            filename: "20.jpg".to_string(),
        };
        assert_eq!(params.height().unwrap(), 20);

        let params = RegionPathParams {
            filename: "abc".to_string(),
            ..params
        };
        assert!(params.height().is_err());
    }

    #[test]
    fn test_query_defaults() {
        let query: RegionQueryParams = serde_json::from_str("{}").unwrap();
        assert_eq!(query.channel, 0);
        assert_eq!(query.quality, DEFAULT_JPEG_QUALITY);
    }

    #[test]
    fn test_region_error_status_codes() {
        let cases = [
            (
                RegionError::InvalidLevel {
                    level: 9,
                    level_count: 2,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                RegionError::InvalidQuality { quality: 0 },
                StatusCode::BAD_REQUEST,
            ),
            (
                RegionError::Pyramid(PyramidError::InvalidRegion {
                    width: 0,
                    height: 1,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                RegionError::Pyramid(PyramidError::Store(StoreError::Io("disk".to_string()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RegionError::Encode(EncodeError::EmptyRegion),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse::with_status("invalid_level", "bad", StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "invalid_level");
        assert_eq!(json["status"], 400);
    }
}
