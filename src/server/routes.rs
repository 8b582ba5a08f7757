//! Router configuration for the region preview service.
//!
//! # Route Structure
//!
//! ```text
//! /health                                          - Health check
//! /info                                            - Pyramid metadata
//! /region/{level}/{x}/{y}/{width}/{height}.jpg     - Stitched region
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mosaic_store::pyramid::{PyramidOptions, PyramidStorage};
//! use mosaic_store::server::{create_router, RouterConfig};
//! use mosaic_store::store::DirectoryStoreSource;
//!
//! let source = DirectoryStoreSource::open("/data/mosaic_1");
//! let pyramid = Arc::new(PyramidStorage::open(source, PyramidOptions::default()).await?);
//!
//! let router = create_router(pyramid, RouterConfig::new().with_cache_max_age(600));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::cache::{RegionCache, DEFAULT_REGION_CACHE_CAPACITY};
use super::handlers::{
    health_handler, info_handler, region_handler, AppState, DEFAULT_MAX_REGION_SIZE,
};
use crate::pyramid::PyramidStorage;
use crate::store::StoreSource;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds, for finished pyramids
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Region cache capacity in bytes
    pub cache_capacity: usize,

    /// Largest width or height of a single region request
    pub max_region_size: u32,
}

impl RouterConfig {
    /// Create a router configuration with defaults:
    /// any CORS origin, 1 hour max-age, tracing on, 64MB region cache.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
            cache_capacity: DEFAULT_REGION_CACHE_CAPACITY,
            max_region_size: DEFAULT_MAX_REGION_SIZE,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_cache_capacity(mut self, bytes: usize) -> Self {
        self.cache_capacity = bytes;
        self
    }

    pub fn with_max_region_size(mut self, pixels: u32) -> Self {
        self.max_region_size = pixels;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router over a shared pyramid.
///
/// The pyramid may still be ingesting; regions are served live and only
/// cached once it is finished.
pub fn create_router<S>(pyramid: Arc<PyramidStorage<S>>, config: RouterConfig) -> Router
where
    S: StoreSource + 'static,
{
    let app_state = AppState::new(pyramid)
        .with_cache(RegionCache::with_capacity(config.cache_capacity))
        .with_cache_max_age(config.cache_max_age)
        .with_max_region_size(config.max_region_size);

    let cors = build_cors_layer(&config);

    // {filename} captures both "{height}" and "{height}.jpg"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/info", get(info_handler::<S>))
        .route(
            "/region/{level}/{x}/{y}/{width}/{filename}",
            get(region_handler::<S>),
        )
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
