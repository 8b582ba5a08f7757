//! On-disk tile store: one directory per level.
//!
//! # Layout
//!
//! ```text
//! <root>/<prefix>_<n>/
//!     Full resolution/
//!         summary.json
//!         tiles.dat
//!     Downsampled_x2/
//!         summary.json
//!         tiles.dat
//!     Downsampled_x4/
//!     ...
//! ```
//!
//! `tiles.dat` is append-only for new tiles (see the record module for the
//! byte layout); overwrites rewrite the pixel bytes of the live record in
//! place. The in-memory index maps each key to its live record and is
//! rebuilt by scanning the file when a level is reopened.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::metadata::{PixelType, SummaryMetadata, TileKey, TileTags};
use crate::raster::Rect;

use super::record::{encode_record, read_exact_at, scan_records, write_all_at};
use super::{check_region_payload, check_tile_payload, StoreSource, StoredTile, TileStore};

/// Name of the per-level summary file.
pub const SUMMARY_FILE: &str = "summary.json";

/// Name of the per-level tile data file.
pub const TILES_FILE: &str = "tiles.dat";

/// Directory name of a level inside an acquisition directory.
pub fn level_dir_name(level: u32) -> String {
    if level == 0 {
        "Full resolution".to_string()
    } else {
        format!("Downsampled_x{}", 1u64 << level)
    }
}

/// Pick `<prefix>_<n>` with `n` one past the largest index already used in
/// `root`. Names are compared case-insensitively and may carry a suffix after
/// the number.
pub fn next_acquisition_name(root: &Path, prefix: &str) -> Result<String, StoreError> {
    let wanted = format!("{}_", prefix).to_uppercase();
    let mut max_index = 0u64;

    if root.exists() {
        for entry in std::fs::read_dir(root)? {
            let name = entry?.file_name().to_string_lossy().to_uppercase();
            let Some(rest) = name.strip_prefix(&wanted) else {
                continue;
            };
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(index) = digits.parse::<u64>() {
                max_index = max_index.max(index);
            }
        }
    }

    Ok(format!("{}_{}", prefix, max_index + 1))
}

// =============================================================================
// Directory Store
// =============================================================================

/// Location of a live record's pixels plus its tags.
struct TileSlot {
    tags: TileTags,
    pixel_offset: u64,
    pixel_len: usize,

    /// Held for writing while the pixel bytes are rewritten in place
    lock: RwLock<()>,
}

/// A level backed by `summary.json` + `tiles.dat` in one directory.
#[derive(Clone)]
pub struct DirectoryStore {
    inner: Arc<DirectoryInner>,
}

struct DirectoryInner {
    name: String,
    pixel_type: PixelType,
    file: Arc<File>,
    index: RwLock<HashMap<TileKey, Arc<TileSlot>>>,

    /// End of the last complete record; appends go here
    end: Mutex<u64>,
    read_only: bool,
    closed: AtomicBool,
}

impl DirectoryStore {
    /// Create an empty level in `dir`, writing its summary.
    pub async fn create(dir: PathBuf, summary: &SummaryMetadata) -> Result<Self, StoreError> {
        let pixel_type = summary
            .pixel_type()
            .map_err(|e| StoreError::Metadata(e.to_string()))?;
        let summary_json = serde_json::to_vec_pretty(summary)?;
        let name = dir.display().to_string();

        let file = tokio::task::spawn_blocking(move || -> Result<File, StoreError> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(SUMMARY_FILE), summary_json)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(dir.join(TILES_FILE))?;
            Ok(file)
        })
        .await
        .map_err(join_error)??;

        debug!(store = %name, "Created directory store");
        Ok(Self::from_parts(name, pixel_type, file, HashMap::new(), 0, false))
    }

    /// Reopen an existing level read-only, rebuilding the index from disk.
    pub async fn open(dir: PathBuf) -> Result<Self, StoreError> {
        let name = dir.display().to_string();
        let location = name.clone();

        let (summary, file, scan) = tokio::task::spawn_blocking(move || {
            let summary_json = std::fs::read(dir.join(SUMMARY_FILE))?;
            let summary: SummaryMetadata = serde_json::from_slice(&summary_json)?;
            let file = File::open(dir.join(TILES_FILE))?;
            let file_len = file.metadata()?.len();
            let scan = scan_records(&file, file_len, &location)?;
            Ok::<_, StoreError>((summary, file, scan))
        })
        .await
        .map_err(join_error)??;

        let pixel_type = summary
            .pixel_type()
            .map_err(|e| StoreError::Metadata(e.to_string()))?;

        let record_count = scan.records.len();
        let mut index = HashMap::new();
        for record in scan.records {
            let slot = TileSlot {
                tags: record.tags,
                pixel_offset: record.pixel_offset,
                pixel_len: record.pixel_len,
                lock: RwLock::new(()),
            };
            index.insert(slot.tags.key(), Arc::new(slot));
        }

        info!(
            store = %name,
            records = record_count,
            tiles = index.len(),
            "Opened directory store"
        );
        Ok(Self::from_parts(name, pixel_type, file, index, scan.valid_len, true))
    }

    fn from_parts(
        name: String,
        pixel_type: PixelType,
        file: File,
        index: HashMap<TileKey, Arc<TileSlot>>,
        end: u64,
        read_only: bool,
    ) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                name,
                pixel_type,
                file: Arc::new(file),
                index: RwLock::new(index),
                end: Mutex::new(end),
                read_only,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.inner.read_only {
            return Err(StoreError::ReadOnly(self.inner.name.clone()));
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed(self.inner.name.clone()));
        }
        Ok(())
    }

    async fn slot(&self, key: &TileKey) -> Option<Arc<TileSlot>> {
        self.inner.index.read().await.get(key).cloned()
    }
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::Io(format!("blocking task failed: {}", err))
}

#[async_trait]
impl TileStore for DirectoryStore {
    async fn put_tile(
        &self,
        key: TileKey,
        tags: TileTags,
        pixels: Bytes,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        check_tile_payload(&tags, self.inner.pixel_type.bytes_per_pixel(), pixels.len())?;

        // The record carries no separate key; reopening rebuilds it from the tags
        let mut tags = tags;
        tags.set_key(key);
        let tags_json = serde_json::to_vec(&tags)?;
        let tags_len = tags_json.len() as u64;
        let record = encode_record(&tags_json, &pixels)?;
        let record_len = record.len() as u64;

        let mut end = self.inner.end.lock().await;
        let offset = *end;
        let file = Arc::clone(&self.inner.file);
        tokio::task::spawn_blocking(move || write_all_at(&file, &record, offset))
            .await
            .map_err(join_error)??;
        *end += record_len;

        let slot = TileSlot {
            tags,
            pixel_offset: offset + super::HEADER_LEN as u64 + tags_len,
            pixel_len: pixels.len(),
            lock: RwLock::new(()),
        };
        self.inner.index.write().await.insert(key, Arc::new(slot));
        Ok(())
    }

    async fn get_tile(&self, key: &TileKey) -> Result<Option<StoredTile>, StoreError> {
        let Some(slot) = self.slot(key).await else {
            return Ok(None);
        };

        let _guard = slot.lock.read().await;
        let file = Arc::clone(&self.inner.file);
        let (offset, len) = (slot.pixel_offset, slot.pixel_len);
        let pixels = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            read_exact_at(&file, &mut buf, offset)?;
            Ok::<_, StoreError>(buf)
        })
        .await
        .map_err(join_error)??;

        Ok(Some(StoredTile {
            tags: slot.tags.clone(),
            pixels: Bytes::from(pixels),
        }))
    }

    async fn get_tags(&self, key: &TileKey) -> Result<Option<TileTags>, StoreError> {
        Ok(self.slot(key).await.map(|slot| slot.tags.clone()))
    }

    async fn overwrite_tile_region(
        &self,
        key: &TileKey,
        rect: Rect,
        pixels: Bytes,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let slot = self.slot(key).await.ok_or(StoreError::TileNotFound(*key))?;
        let bytes_per_pixel = self.inner.pixel_type.bytes_per_pixel();
        check_region_payload(&slot.tags, rect, bytes_per_pixel, pixels.len())?;
        if rect.is_empty() {
            return Ok(());
        }

        let _guard = slot.lock.write().await;
        let file = Arc::clone(&self.inner.file);
        let base = slot.pixel_offset;
        let tile_width = slot.tags.width as u64;
        tokio::task::spawn_blocking(move || {
            let row_len = rect.width as usize * bytes_per_pixel;
            for (row, chunk) in pixels.chunks_exact(row_len).enumerate() {
                let pixel = (rect.y as u64 + row as u64) * tile_width + rect.x as u64;
                write_all_at(&file, chunk, base + pixel * bytes_per_pixel as u64)?;
            }
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(join_error)??;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<TileKey>, StoreError> {
        let mut keys: Vec<TileKey> = self.inner.index.read().await.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) || self.inner.read_only {
            return Ok(());
        }
        // Wait out any in-flight append before syncing
        let _end = self.inner.end.lock().await;
        let file = Arc::clone(&self.inner.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(join_error)??;
        debug!(store = %self.inner.name, "Closed directory store");
        Ok(())
    }

    async fn size_bytes(&self) -> u64 {
        *self.inner.end.lock().await
    }

    fn describe(&self) -> &str {
        &self.inner.name
    }
}

// =============================================================================
// Directory Store Source
// =============================================================================

/// Creates and opens the level directories of one acquisition.
#[derive(Debug, Clone)]
pub struct DirectoryStoreSource {
    dir: PathBuf,
}

impl DirectoryStoreSource {
    /// Create a fresh acquisition directory `<root>/<prefix>_<n>`.
    pub async fn create_acquisition(root: &Path, prefix: &str) -> Result<Self, StoreError> {
        let root = root.to_path_buf();
        let prefix = prefix.to_string();
        let dir = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            let dir = root.join(next_acquisition_name(&root, &prefix)?);
            std::fs::create_dir(&dir)?;
            Ok::<_, StoreError>(dir)
        })
        .await
        .map_err(join_error)??;

        info!(dir = %dir.display(), "Created acquisition directory");
        Ok(Self { dir })
    }

    /// Use an existing acquisition directory.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn level_dir(&self, level: u32) -> PathBuf {
        self.dir.join(level_dir_name(level))
    }
}

#[async_trait]
impl StoreSource for DirectoryStoreSource {
    type Store = DirectoryStore;

    async fn create_level(
        &self,
        level: u32,
        summary: &SummaryMetadata,
    ) -> Result<DirectoryStore, StoreError> {
        let summary = if level == 0 {
            summary.clone()
        } else {
            summary.for_downsampled_level()
        };
        DirectoryStore::create(self.level_dir(level), &summary).await
    }

    async fn open_level(&self, level: u32) -> Result<Option<DirectoryStore>, StoreError> {
        let dir = self.level_dir(level);
        if !tokio::fs::try_exists(dir.join(TILES_FILE)).await? {
            return Ok(None);
        }
        DirectoryStore::open(dir).await.map(Some)
    }

    async fn read_summary(&self) -> Result<SummaryMetadata, StoreError> {
        let json = tokio::fs::read(self.level_dir(0).join(SUMMARY_FILE)).await?;
        Ok(serde_json::from_slice(&json)?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mosaic-store-{}-{}-{}",
            name,
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn tags(position: u32) -> TileTags {
        TileTags::new(TileKey::new(0, 0, 0, position), 2, 2)
    }

    #[test]
    fn test_level_dir_names() {
        assert_eq!(level_dir_name(0), "Full resolution");
        assert_eq!(level_dir_name(1), "Downsampled_x2");
        assert_eq!(level_dir_name(3), "Downsampled_x8");
    }

    #[test]
    fn test_next_acquisition_name() {
        let root = scratch_dir("naming");
        assert_eq!(next_acquisition_name(&root, "Scan").unwrap(), "Scan_1");

        std::fs::create_dir_all(root.join("scan_3")).unwrap();
        std::fs::create_dir_all(root.join("SCAN_7.backup")).unwrap();
        std::fs::create_dir_all(root.join("Scan_x")).unwrap();
        std::fs::create_dir_all(root.join("Other_12")).unwrap();
        assert_eq!(next_acquisition_name(&root, "Scan").unwrap(), "Scan_8");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let dir = scratch_dir("store");
        let summary = SummaryMetadata::new("acq", 2, 2, PixelType::Gray8);
        let store = DirectoryStore::create(dir.clone(), &summary).await.unwrap();
        let key = TileKey::new(0, 0, 0, 0);

        store
            .put_tile(key, tags(0), Bytes::from_static(&[1, 2, 3, 4]))
            .await
            .unwrap();
        store
            .overwrite_tile_region(&key, Rect::new(0, 1, 2, 1), Bytes::from_static(&[8, 9]))
            .await
            .unwrap();

        let tile = store.get_tile(&key).await.unwrap().unwrap();
        assert_eq!(&tile.pixels[..], &[1, 2, 8, 9]);
        assert!(store.size_bytes().await > 4);

        store.close().await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_reopen_supersedes_and_skips_truncated_tail() {
        let dir = scratch_dir("reopen");
        let summary = SummaryMetadata::new("acq", 2, 2, PixelType::Gray8);
        let store = DirectoryStore::create(dir.clone(), &summary).await.unwrap();
        let key = TileKey::new(0, 0, 0, 0);

        store
            .put_tile(key, tags(0), Bytes::from_static(&[1, 1, 1, 1]))
            .await
            .unwrap();
        store
            .put_tile(key, tags(0), Bytes::from_static(&[2, 2, 2, 2]))
            .await
            .unwrap();
        store
            .put_tile(TileKey::new(0, 0, 0, 1), tags(1), Bytes::from_static(&[3, 3, 3, 3]))
            .await
            .unwrap();
        store.close().await.unwrap();

        // Chop the last record in half
        let path = dir.join(TILES_FILE);
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();
        drop(file);

        let reopened = DirectoryStore::open(dir.clone()).await.unwrap();
        assert!(reopened.is_read_only());
        assert_eq!(reopened.list_keys().await.unwrap(), vec![key]);
        let tile = reopened.get_tile(&key).await.unwrap().unwrap();
        assert_eq!(&tile.pixels[..], &[2, 2, 2, 2]);

        let write = reopened
            .put_tile(key, tags(0), Bytes::from_static(&[0, 0, 0, 0]))
            .await;
        assert!(matches!(write, Err(StoreError::ReadOnly(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_foreign_file() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let summary = SummaryMetadata::new("acq", 2, 2, PixelType::Gray8);
        std::fs::write(dir.join(SUMMARY_FILE), serde_json::to_vec(&summary).unwrap()).unwrap();
        std::fs::write(dir.join(TILES_FILE), b"not a tile file at all").unwrap();

        let result = DirectoryStore::open(dir.clone()).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_source_levels_and_summary() {
        let root = scratch_dir("source");
        let source = DirectoryStoreSource::create_acquisition(&root, "Mosaic")
            .await
            .unwrap();
        assert!(source.dir().ends_with("Mosaic_1"));

        let summary = SummaryMetadata::new("Mosaic", 10, 10, PixelType::Gray16).with_overlap(2, 2);
        source.create_level(0, &summary).await.unwrap();
        source.create_level(1, &summary).await.unwrap();

        assert_eq!(source.read_summary().await.unwrap().width, 10);
        let low: SummaryMetadata = serde_json::from_slice(
            &std::fs::read(source.level_dir(1).join(SUMMARY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(low.width, 8);

        assert!(source.open_level(1).await.unwrap().is_some());
        assert!(source.open_level(2).await.unwrap().is_none());

        let second = DirectoryStoreSource::create_acquisition(&root, "mosaic")
            .await
            .unwrap();
        assert!(second.dir().ends_with("mosaic_2"));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
