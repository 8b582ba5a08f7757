//! Pyramid integration tests.
//!
//! Tests verify:
//! - Stitched level 0 reads match the tile interiors
//! - Pyramid growth over several levels with backfill
//! - Negative grid coordinates at every level
//! - Slice filtering and key listing
//! - Close semantics

use bytes::Bytes;

use mosaic_store::{PyramidError, TileKey, TileTags};

use super::test_utils::{gradient_tile, gray8_summary, ingest_at, memory_pyramid, solid_tile};

// =============================================================================
// Stitching
// =============================================================================

#[tokio::test]
async fn test_level_zero_stitching_matches_tile_interiors() {
    // 6x6 stored tiles with a 2 pixel overlap: 4x4 interiors at offset (1, 1)
    let pyramid = memory_pyramid(gray8_summary("stitch", 6, 2)).await;
    let mut tiles = Vec::new();
    for row in 0..2i64 {
        for col in 0..3i64 {
            let pixels = gradient_tile(6, 6, (row * 3 + col) as u32 * 37);
            ingest_at(&pyramid, row, col, pixels.clone()).await;
            tiles.push(((row, col), pixels));
        }
    }

    let region = pyramid.read_region(0, 0, 0, 0, 0, 0, 12, 8).await.unwrap();
    assert_eq!(region.data.len(), 12 * 8);

    for ((row, col), pixels) in &tiles {
        for y in 0..4usize {
            for x in 0..4usize {
                let stitched = region.data[(*row as usize * 4 + y) * 12 + *col as usize * 4 + x];
                let stored = pixels[(y + 1) * 6 + x + 1];
                assert_eq!(stitched, stored, "tile ({row}, {col}) pixel ({x}, {y})");
            }
        }
    }
}

#[tokio::test]
async fn test_region_straddling_missing_tile_is_zero_filled() {
    let pyramid = memory_pyramid(gray8_summary("gaps", 4, 0)).await;
    ingest_at(&pyramid, 0, 0, solid_tile(16, 9)).await;

    let region = pyramid.read_region(0, 0, 0, 0, 2, 0, 4, 1).await.unwrap();
    assert_eq!(&region.data[..], &[9, 9, 0, 0]);

    // Nothing at all under the region
    let region = pyramid.read_region(0, 0, 0, 0, 100, 100, 3, 3).await.unwrap();
    assert!(region.data.iter().all(|&v| v == 0));
    assert!(region.tags.is_none());
}

// =============================================================================
// Growth
// =============================================================================

#[tokio::test]
async fn test_row_of_tiles_grows_to_level_two() {
    let pyramid = memory_pyramid(gray8_summary("row", 4, 0)).await;

    for (col, value) in [0u8, 40, 80, 120].into_iter().enumerate() {
        ingest_at(&pyramid, 0, col as i64, solid_tile(16, value)).await;
    }
    assert_eq!(pyramid.max_resolution_level(), 2);
    assert_eq!(pyramid.num_res_levels(), 3);

    let level1 = pyramid.read_region(0, 0, 0, 1, 0, 0, 8, 2).await.unwrap();
    assert_eq!(
        &level1.data[..],
        &[0, 0, 40, 40, 80, 80, 120, 120, 0, 0, 40, 40, 80, 80, 120, 120]
    );

    // Level 2 is derived from the level 1 tiles, whose lower halves are empty
    let level2 = pyramid.read_region(0, 0, 0, 2, 0, 0, 4, 2).await.unwrap();
    assert_eq!(&level2.data[..], &[0, 40, 80, 120, 0, 0, 0, 0]);
}

#[tokio::test]
async fn test_max_level_never_decreases() {
    let pyramid = memory_pyramid(gray8_summary("grow", 2, 0)).await;
    let mut last = 0;
    for (row, col) in [(0, 0), (0, 1), (2, 0), (0, 0), (1, 1)] {
        ingest_at(&pyramid, row, col, solid_tile(4, 1)).await;
        let level = pyramid.max_resolution_level();
        assert!(level >= last);
        last = level;
    }
    assert_eq!(last, 2);
}

// =============================================================================
// Negative Grid Coordinates
// =============================================================================

#[tokio::test]
async fn test_negative_grid_coordinates() {
    let pyramid = memory_pyramid(gray8_summary("negative", 4, 0)).await;
    ingest_at(&pyramid, 0, 0, solid_tile(16, 100)).await;
    ingest_at(&pyramid, -1, -1, solid_tile(16, 50)).await;
    assert_eq!(pyramid.max_resolution_level(), 1);

    let extent = pyramid.grid_extent().await.unwrap();
    assert_eq!((extent.min_row, extent.min_col), (-1, -1));
    assert_eq!((extent.tiles_wide(), extent.tiles_high()), (2, 2));

    let level0 = pyramid.read_region(0, 0, 0, 0, -1, -1, 2, 2).await.unwrap();
    assert_eq!(&level0.data[..], &[50, 0, 0, 100]);

    // Tile (-1, -1) lands in the bottom-right quadrant of level 1 tile (-1, -1)
    let level1 = pyramid.read_region(0, 0, 0, 1, -2, -2, 4, 4).await.unwrap();
    assert_eq!(
        &level1.data[..],
        &[50, 50, 0, 0, 50, 50, 0, 0, 0, 0, 100, 100, 0, 0, 100, 100]
    );
}

// =============================================================================
// Keys and Slices
// =============================================================================

#[tokio::test]
async fn test_tiles_with_data_at_filters_by_slice() {
    let pyramid = memory_pyramid(gray8_summary("slices", 2, 0)).await;
    ingest_at(&pyramid, 0, 0, solid_tile(4, 1)).await;

    let position = pyramid.register_grid_position(3, -2, 0.0, 0.0).await;
    let key = TileKey::new(0, 1, 0, position);
    pyramid
        .ingest_tile(0, 1, 0, position, solid_tile(4, 2), TileTags::new(key, 2, 2))
        .await
        .unwrap();

    let slice0: Vec<_> = pyramid.tiles_with_data_at(0).await.unwrap().into_iter().collect();
    assert_eq!(slice0, vec![(0, 0)]);
    let slice1: Vec<_> = pyramid.tiles_with_data_at(1).await.unwrap().into_iter().collect();
    assert_eq!(slice1, vec![(3, -2)]);
    assert!(pyramid.tiles_with_data_at(2).await.unwrap().is_empty());

    assert_eq!(pyramid.tile_keys().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_pass_through_tags_survive() {
    let pyramid = memory_pyramid(gray8_summary("tags", 2, 0)).await;
    let position = pyramid.register_grid_position(0, 0, 12.5, -3.0).await;
    let key = TileKey::new(0, 0, 0, position);
    let tags = TileTags::new(key, 2, 2).with_extra("Exposure-ms", 15.0);

    pyramid
        .ingest_tile(0, 0, 0, position, Bytes::from_static(&[1, 2, 3, 4]), tags)
        .await
        .unwrap();

    let tile = pyramid.get_tile(0, 0, 0, position, 0).await.unwrap().unwrap();
    assert_eq!(tile.tags.extra.get("Exposure-ms"), Some(&serde_json::json!(15.0)));
    assert_eq!(tile.tags.position_name.as_deref(), Some("Grid_0_0"));
    assert_eq!(&tile.pixels[..], &[1, 2, 3, 4]);
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn test_close_finishes_and_rejects_ingest() {
    let pyramid = memory_pyramid(gray8_summary("close", 2, 0)).await;
    ingest_at(&pyramid, 0, 0, solid_tile(4, 7)).await;
    assert!(!pyramid.is_finished());

    pyramid.close().await.unwrap().unwrap();
    assert!(pyramid.is_finished());

    let position = pyramid.register_grid_position(0, 1, 0.0, 0.0).await;
    let key = TileKey::new(0, 0, 0, position);
    let result = pyramid
        .ingest_tile(0, 0, 0, position, solid_tile(4, 1), TileTags::new(key, 2, 2))
        .await;
    assert!(matches!(result, Err(PyramidError::Closed)));

    // Reads still work after close
    let region = pyramid.read_region(0, 0, 0, 0, 0, 0, 2, 2).await.unwrap();
    assert_eq!(&region.data[..], &[7, 7, 7, 7]);
}
