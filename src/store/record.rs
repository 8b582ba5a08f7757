//! On-disk record format of `tiles.dat` and positioned file I/O.
//!
//! The file is a plain sequence of records, appended in write order:
//!
//! ```text
//! +--------+-----------+-------------+-----------------+----------------+
//! | "MTIL" | tags_len  | pixels_len  | tags (JSON)     | pixels         |
//! | 4 B    | u32 LE    | u32 LE      | tags_len bytes  | pixels_len B   |
//! +--------+-----------+-------------+-----------------+----------------+
//! ```
//!
//! A later record for a key supersedes earlier ones. Pixel bytes of the live
//! record may be rewritten in place; headers and tags never change.

use std::fs::File;

use tracing::warn;

use crate::error::StoreError;
use crate::metadata::TileTags;

/// Marker at the start of every record.
pub const RECORD_MAGIC: &[u8; 4] = b"MTIL";

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 12;

// =============================================================================
// Record Header
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tags_len: u32,
    pub pixels_len: u32,
}

impl RecordHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(RECORD_MAGIC);
        out[4..8].copy_from_slice(&self.tags_len.to_le_bytes());
        out[8..12].copy_from_slice(&self.pixels_len.to_le_bytes());
        out
    }

    /// Decode a header. Returns `None` if the magic does not match.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Option<Self> {
        if &bytes[0..4] != RECORD_MAGIC {
            return None;
        }
        Some(Self {
            tags_len: read_u32_le(&bytes[4..8]),
            pixels_len: read_u32_le(&bytes[8..12]),
        })
    }

    /// Total record length including the header.
    pub fn record_len(&self) -> u64 {
        HEADER_LEN as u64 + self.tags_len as u64 + self.pixels_len as u64
    }
}

/// Read a little-endian u32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Serialize one complete record.
pub fn encode_record(tags_json: &[u8], pixels: &[u8]) -> Result<Vec<u8>, StoreError> {
    let header = RecordHeader {
        tags_len: u32::try_from(tags_json.len())
            .map_err(|_| StoreError::Metadata("tags exceed 4 GiB".to_string()))?,
        pixels_len: u32::try_from(pixels.len()).map_err(|_| StoreError::PayloadSize {
            expected: u32::MAX as usize,
            actual: pixels.len(),
        })?,
    };
    let mut out = Vec::with_capacity(header.record_len() as usize);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(tags_json);
    out.extend_from_slice(pixels);
    Ok(out)
}

// =============================================================================
// Scanning
// =============================================================================

/// A record found while scanning a data file.
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    pub tags: TileTags,
    pub pixel_offset: u64,
    pub pixel_len: usize,
}

/// Result of scanning a data file from the start.
#[derive(Debug, Default)]
pub struct Scan {
    pub records: Vec<ScannedRecord>,

    /// Offset just past the last complete record
    pub valid_len: u64,
}

/// Walk every complete record of `file`.
///
/// A record cut short by the end of the file is the remnant of an interrupted
/// append; it is dropped with a warning. A bad magic anywhere else means the
/// file is not a tile data file.
pub fn scan_records(file: &File, file_len: u64, location: &str) -> Result<Scan, StoreError> {
    let mut scan = Scan::default();
    let mut offset = 0u64;

    while offset < file_len {
        if file_len - offset < HEADER_LEN as u64 {
            warn!(location, offset, "Ignoring truncated record header");
            break;
        }
        let mut raw = [0u8; HEADER_LEN];
        read_exact_at(file, &mut raw, offset)?;
        let header = RecordHeader::decode(&raw).ok_or_else(|| StoreError::Corrupt {
            location: location.to_string(),
            reason: format!("bad record magic at offset {}", offset),
        })?;

        if offset + header.record_len() > file_len {
            warn!(
                location,
                offset,
                record_len = header.record_len(),
                "Ignoring truncated trailing record"
            );
            break;
        }

        let mut tags_json = vec![0u8; header.tags_len as usize];
        read_exact_at(file, &mut tags_json, offset + HEADER_LEN as u64)?;
        let tags: TileTags = serde_json::from_slice(&tags_json).map_err(|e| StoreError::Corrupt {
            location: location.to_string(),
            reason: format!("invalid tags at offset {}: {}", offset, e),
        })?;

        scan.records.push(ScannedRecord {
            tags,
            pixel_offset: offset + HEADER_LEN as u64 + header.tags_len as u64,
            pixel_len: header.pixels_len as usize,
        });
        offset += header.record_len();
        scan.valid_len = offset;
    }

    Ok(scan)
}

// =============================================================================
// Positioned I/O
// =============================================================================

#[cfg(unix)]
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<(), StoreError> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)?;
    Ok(())
}

#[cfg(unix)]
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> Result<(), StoreError> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)?;
    Ok(())
}

#[cfg(windows)]
pub fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> Result<(), StoreError> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(StoreError::Io("unexpected end of file".to_string()));
        }
        buf = &mut buf[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
pub fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> Result<(), StoreError> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        if n == 0 {
            return Err(StoreError::Io("failed to write whole buffer".to_string()));
        }
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
