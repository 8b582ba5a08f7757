//! HTTP preview layer.
//!
//! Serves stitched regions of any pyramid level as JPEG, live while an
//! acquisition is still being ingested.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      GET /region/{level}/{x}/{y}/{width}/{height}.jpg           │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    cache    │  │        routes           │  │
//! │  │ (requests)  │  │ (LRU JPEGs) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                 PyramidStorage::read_region
//! ```

pub mod cache;
pub mod handlers;
pub mod routes;

pub use cache::{RegionCache, RegionCacheKey, DEFAULT_REGION_CACHE_CAPACITY};
pub use handlers::{
    health_handler, info_handler, region_handler, AppState, ErrorResponse, GridExtentResponse,
    HealthResponse, InfoResponse, RegionPathParams, RegionQueryParams, DEFAULT_MAX_REGION_SIZE,
};
pub use routes::{create_router, RouterConfig};
