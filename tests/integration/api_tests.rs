//! API integration tests for the region preview service.
//!
//! Tests verify:
//! - Region retrieval as JPEG, live and after close
//! - Cache behavior for finished pyramids
//! - Error cases and their status codes
//! - Info and health endpoints

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mosaic_store::{create_router, RouterConfig};

use super::test_utils::{gradient_tile, gray8_summary, ingest_at, is_valid_jpeg, memory_pyramid};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Region Retrieval
// =============================================================================

#[tokio::test]
async fn test_region_retrieval_while_acquiring() {
    let pyramid = memory_pyramid(gray8_summary("live", 16, 0)).await;
    ingest_at(&pyramid, 0, 0, gradient_tile(16, 16, 0)).await;
    let router = create_router(pyramid.clone(), RouterConfig::new());

    let response = router.oneshot(get("/region/0/0/0/16/16.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/jpeg"
    );
    // Still acquiring: nothing may be cached downstream
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
    assert_eq!(
        response.headers().get("x-region-cache-hit").unwrap(),
        "false"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_jpeg(&body), "Response should be a valid JPEG");
}

#[tokio::test]
async fn test_region_without_extension_and_negative_origin() {
    let pyramid = memory_pyramid(gray8_summary("plain", 8, 0)).await;
    ingest_at(&pyramid, 0, 0, gradient_tile(8, 8, 3)).await;
    let router = create_router(pyramid, RouterConfig::new());

    let response = router
        .oneshot(get("/region/0/-4/-4/8/8?quality=50"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_finished_pyramid_regions_are_cached() {
    let pyramid = memory_pyramid(gray8_summary("cached", 8, 0)).await;
    ingest_at(&pyramid, 0, 0, gradient_tile(8, 8, 1)).await;
    pyramid.close().await.unwrap().unwrap();
    let router = create_router(pyramid, RouterConfig::new().with_cache_max_age(120));

    let first = router
        .clone()
        .oneshot(get("/region/0/0/0/8/8.jpg"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers().get("x-region-cache-hit").unwrap(), "false");
    assert_eq!(
        first.headers().get("cache-control").unwrap(),
        "public, max-age=120"
    );
    let first_body = first.into_body().collect().await.unwrap().to_bytes();

    let second = router.oneshot(get("/region/0/0/0/8/8.jpg")).await.unwrap();
    assert_eq!(second.headers().get("x-region-cache-hit").unwrap(), "true");
    let second_body = second.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(first_body, second_body);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_region_errors() {
    let pyramid = memory_pyramid(gray8_summary("errors", 8, 0)).await;
    ingest_at(&pyramid, 0, 0, gradient_tile(8, 8, 0)).await;
    let router = create_router(pyramid, RouterConfig::new().with_max_region_size(64));

    let cases = [
        ("/region/3/0/0/8/8.jpg", StatusCode::BAD_REQUEST, "invalid_level"),
        ("/region/0/0/0/8/8.jpg?quality=0", StatusCode::BAD_REQUEST, "invalid_quality"),
        ("/region/0/0/0/65/8.jpg", StatusCode::BAD_REQUEST, "region_too_large"),
        ("/region/0/0/0/0/8.jpg", StatusCode::BAD_REQUEST, "invalid_region"),
        ("/region/0/0/0/8/abc.jpg", StatusCode::BAD_REQUEST, "invalid_region"),
        (
            "/region/0/9223372036854775806/0/4/4.jpg",
            StatusCode::BAD_REQUEST,
            "invalid_region",
        ),
    ];

    for (uri, status, error) in cases {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), status, "{uri}");
        let json = json_body(response).await;
        assert_eq!(json["error"], error, "{uri}");
        assert_eq!(json["status"], status.as_u16());
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let pyramid = memory_pyramid(gray8_summary("routes", 8, 0)).await;
    let router = create_router(pyramid, RouterConfig::new());

    let response = router.oneshot(get("/tiles/0/0/0.jpg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Info and Health
// =============================================================================

#[tokio::test]
async fn test_info_endpoint() {
    let pyramid = memory_pyramid(gray8_summary("info", 8, 2)).await;
    ingest_at(&pyramid, 0, 0, gradient_tile(8, 8, 0)).await;
    ingest_at(&pyramid, 0, -1, gradient_tile(8, 8, 0)).await;
    let router = create_router(pyramid, RouterConfig::new());

    let response = router.oneshot(get("/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["prefix"], "info");
    assert_eq!(json["pixel_type"], "gray8");
    assert_eq!(json["tile_width"], 6);
    assert_eq!(json["overlap_x"], 2);
    assert_eq!(json["level_count"], 2);
    assert_eq!(json["finished"], false);
    assert_eq!(json["grid"]["min_col"], -1);
    assert_eq!(json["grid"]["tiles_wide"], 2);
}

#[tokio::test]
async fn test_health_endpoint() {
    let pyramid = memory_pyramid(gray8_summary("health", 8, 0)).await;
    let router = create_router(pyramid, RouterConfig::new().with_tracing(false));

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}
