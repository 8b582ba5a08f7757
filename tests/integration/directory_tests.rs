//! On-disk acquisition tests.
//!
//! Tests verify:
//! - Level directory layout and per-level summaries
//! - Unique acquisition naming
//! - Reopening a closed acquisition read-only
//! - Recovery from an interrupted trailing write

use std::io::Write;
use std::sync::Arc;

use mosaic_store::store::{level_dir_name, RECORD_MAGIC};
use mosaic_store::{
    DirectoryStoreSource, PyramidError, PyramidOptions, PyramidStorage, SummaryMetadata, TileKey,
    TileTags,
};

use super::test_utils::{gradient_tile, gray8_summary, ingest_at, solid_tile, ScratchDir};

async fn create_pyramid(
    root: &ScratchDir,
    summary: SummaryMetadata,
) -> (std::path::PathBuf, Arc<PyramidStorage<DirectoryStoreSource>>) {
    let source = DirectoryStoreSource::create_acquisition(root.path(), &summary.prefix)
        .await
        .unwrap();
    let dir = source.dir().to_path_buf();
    let pyramid = PyramidStorage::create(source, summary, PyramidOptions::default())
        .await
        .unwrap();
    (dir, Arc::new(pyramid))
}

async fn reopen(dir: &std::path::Path) -> PyramidStorage<DirectoryStoreSource> {
    PyramidStorage::open(DirectoryStoreSource::open(dir), PyramidOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_acquisition_directories_are_numbered() {
    let root = ScratchDir::new("numbering");
    let (first, _a) = create_pyramid(&root, gray8_summary("Scan", 2, 0)).await;
    let (second, _b) = create_pyramid(&root, gray8_summary("Scan", 2, 0)).await;

    assert_eq!(first.file_name().unwrap(), "Scan_1");
    assert_eq!(second.file_name().unwrap(), "Scan_2");
}

#[tokio::test]
async fn test_level_layout_and_downsampled_summary() {
    let root = ScratchDir::new("layout");
    let (dir, pyramid) = create_pyramid(&root, gray8_summary("Layout", 6, 2)).await;
    for col in 0..3 {
        ingest_at(&pyramid, 0, col, solid_tile(36, 10)).await;
    }
    pyramid.close().await.unwrap().unwrap();

    for level in 0..=2 {
        let level_dir = dir.join(level_dir_name(level));
        assert!(level_dir.join("summary.json").is_file(), "level {level}");
        assert!(level_dir.join("tiles.dat").is_file(), "level {level}");
    }
    assert!(dir.join("Downsampled_x4").is_dir());
    assert!(!dir.join("Downsampled_x8").exists());

    let json = std::fs::read(dir.join("Downsampled_x2").join("summary.json")).unwrap();
    let summary: SummaryMetadata = serde_json::from_slice(&json).unwrap();
    assert_eq!((summary.width, summary.height), (4, 4));
    assert_eq!(summary.prefix, "Layout");
}

#[tokio::test]
async fn test_reopen_matches_written_pyramid() {
    let root = ScratchDir::new("reopen");
    let (dir, pyramid) = create_pyramid(&root, gray8_summary("Reopen", 4, 0)).await;
    for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        ingest_at(&pyramid, row, col, gradient_tile(4, 4, (row * 2 + col) as u32 * 50)).await;
    }
    let before0 = pyramid.read_region(0, 0, 0, 0, 0, 0, 8, 8).await.unwrap();
    let before1 = pyramid.read_region(0, 0, 0, 1, 0, 0, 4, 4).await.unwrap();
    pyramid.close().await.unwrap().unwrap();

    let reopened = reopen(&dir).await;
    assert!(reopened.is_read_only());
    assert!(reopened.is_finished());
    assert_eq!(reopened.num_res_levels(), 2);
    assert_eq!(reopened.summary().prefix, "Reopen");

    let after0 = reopened.read_region(0, 0, 0, 0, 0, 0, 8, 8).await.unwrap();
    let after1 = reopened.read_region(0, 0, 0, 1, 0, 0, 4, 4).await.unwrap();
    assert_eq!(before0.data, after0.data);
    assert_eq!(before1.data, after1.data);

    assert_eq!(reopened.tiles_with_data_at(0).await.unwrap().len(), 4);
    assert_eq!(reopened.grid_row_col(3, 0).await.unwrap(), (1, 1));
    assert!(reopened.dataset_size().await > 0);

    let key = TileKey::new(0, 0, 0, 0);
    let result = reopened
        .ingest_tile(0, 0, 0, 0, solid_tile(16, 1), TileTags::new(key, 4, 4))
        .await;
    assert!(matches!(result, Err(PyramidError::ReadOnly)));
}

#[tokio::test]
async fn test_reopen_ignores_truncated_trailing_record() {
    let root = ScratchDir::new("truncated");
    let (dir, pyramid) = create_pyramid(&root, gray8_summary("Torn", 2, 0)).await;
    ingest_at(&pyramid, 0, 0, solid_tile(4, 3)).await;
    pyramid.close().await.unwrap().unwrap();

    // A write interrupted after its header
    let tiles = dir.join(level_dir_name(0)).join("tiles.dat");
    let mut file = std::fs::OpenOptions::new().append(true).open(&tiles).unwrap();
    file.write_all(RECORD_MAGIC).unwrap();
    file.write_all(&200u32.to_le_bytes()).unwrap();
    file.write_all(&4u32.to_le_bytes()).unwrap();
    file.write_all(b"{\"wid").unwrap();
    drop(file);

    let reopened = reopen(&dir).await;
    assert_eq!(reopened.tile_keys().await.unwrap().len(), 1);
    let region = reopened.read_region(0, 0, 0, 0, 0, 0, 2, 2).await.unwrap();
    assert_eq!(&region.data[..], &[3, 3, 3, 3]);
}

#[tokio::test]
async fn test_open_missing_acquisition_fails() {
    let root = ScratchDir::new("missing");
    let result = PyramidStorage::open(
        DirectoryStoreSource::open(root.path().join("Nothing_1")),
        PyramidOptions::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(PyramidError::FullResolutionUnavailable(_))
    ));
}
