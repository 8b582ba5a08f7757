//! Concurrent read/ingest tests.
//!
//! Readers run while one producer keeps rewriting a tile. Every tile is
//! solid, so a read mixing two versions shows up as a non-uniform block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mosaic_store::{DirectoryStoreSource, PyramidOptions, PyramidStorage, StoreSource};

use super::test_utils::{gray8_summary, ingest_at, memory_pyramid, solid_tile, ScratchDir};

const ROUNDS: u8 = 60;
const READERS: usize = 4;

async fn hammer<S: StoreSource + 'static>(pyramid: Arc<PyramidStorage<S>>) {
    // Two tiles side by side give a level 1 tile to overwrite in place
    ingest_at(&pyramid, 0, 0, solid_tile(64, 1)).await;
    ingest_at(&pyramid, 0, 1, solid_tile(64, 200)).await;
    assert_eq!(pyramid.max_resolution_level(), 1);

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..READERS {
        let pyramid = Arc::clone(&pyramid);
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            loop {
                let finished = done.load(Ordering::Acquire);
                let full = pyramid.read_region(0, 0, 0, 0, 0, 0, 8, 8).await.unwrap();
                assert!(
                    full.data.iter().all(|&v| v == full.data[0]),
                    "torn level 0 tile"
                );

                let low = pyramid.read_region(0, 0, 0, 1, 0, 0, 4, 4).await.unwrap();
                assert!(
                    low.data.iter().all(|&v| v == low.data[0]),
                    "torn level 1 quadrant"
                );
                if finished {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for value in 2..ROUNDS {
        ingest_at(&pyramid, 0, 0, solid_tile(64, value)).await;
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.await.unwrap();
    }

    let low = pyramid.read_region(0, 0, 0, 1, 0, 0, 8, 4).await.unwrap();
    assert_eq!(low.data[0], ROUNDS - 1);
    assert_eq!(low.data[4], 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_readers_never_see_torn_tiles() {
    let pyramid = memory_pyramid(gray8_summary("concurrent", 8, 0)).await;
    hammer(pyramid).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_directory_readers_never_see_torn_tiles() {
    let root = ScratchDir::new("concurrent");
    let source = DirectoryStoreSource::create_acquisition(root.path(), "Concurrent")
        .await
        .unwrap();
    let pyramid = PyramidStorage::create(
        source,
        gray8_summary("Concurrent", 8, 0),
        PyramidOptions::default(),
    )
    .await
    .unwrap();
    hammer(Arc::new(pyramid)).await;
}
