//! Side-car index file format constants and metadata types.
//!
//! ```text
//! [HEADER] magic u32 "MDXI" | format u16
//! [SCHEMA] count u16, each: len u8 | column name
//! [META]   count u16, each: key len u16 | key | value len u32 | value
//! [PATHS]  count u16, each: len u16 | UTF-8 path
//! [ROWS]   count u64, each: key len u32 | key | path id u16 | file_pos u64 |
//!          compressed_size u64 | decompressed_size u64 | record_block_type u8 |
//!          record_start u64 | record_end u64 | offset u64
//! [FOOTER] crc32 u32 (over everything before the footer) | magic u32
//! ```
//!
//! All integers are little-endian.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::mdict::types::error::Result;
use crate::mdict::types::models::{IndexEntry, MdictHeader};

/// Magic number identifying side-car index files (ASCII "MDXI").
pub const INDEX_MAGIC: u32 = 0x4D44_5849;

/// Bumped whenever the row layout changes.
pub const INDEX_FORMAT_VERSION: u16 = 1;

/// Size of the footer in bytes: 4 (`crc32`) + 4 (`magic`).
pub const FOOTER_BYTES: usize = 4 + 4;

/// Extension appended to the container file name.
pub const SIDECAR_EXTENSION: &str = "idx";

/// Row columns, in storage order.
pub const COLUMNS: [&str; 9] = [
    "key_text",
    "file_path",
    "file_pos",
    "compressed_size",
    "decompressed_size",
    "record_block_type",
    "record_start",
    "record_end",
    "offset",
];

pub mod meta_keys {
    pub const ENCODING: &str = "encoding";
    pub const TITLE: &str = "title";
    pub const VERSION: &str = "version";
    pub const DESCRIPTION: &str = "description";
    pub const ENTRY_COUNT: &str = "entry_count";
    pub const SOURCE_PATH: &str = "source_path";
    pub const SOURCE_SIZE: &str = "source_size";
    pub const SOURCE_MTIME: &str = "source_mtime";
}

/// Side-car location for `source`: `<file>.idx` next to it, or inside `cache_dir`.
pub fn sidecar_path(source: &Path, cache_dir: Option<&Path>) -> PathBuf {
    let mut name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    match cache_dir {
        Some(dir) => dir.join(name),
        None => source.with_file_name(name),
    }
}

/// Identity of the source container at the time the index was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFingerprint {
    pub path: String,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_nanos: u128,
}

impl SourceFingerprint {
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime_nanos = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(Self {
            path: canonical_path(path).to_string_lossy().into_owned(),
            size: metadata.len(),
            mtime_nanos,
        })
    }
}

/// Absolute form of `path`, falling back to the path as given.
pub fn canonical_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Header metadata and source fingerprint stored alongside the rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub encoding: String,
    pub title: String,
    pub version: String,
    pub description: String,
    pub entry_count: u64,
    pub source: SourceFingerprint,
}

impl IndexMeta {
    pub fn describe(header: &MdictHeader, source: SourceFingerprint) -> Self {
        Self {
            encoding: header.encoding.label().to_string(),
            title: header.title.clone(),
            version: header.engine_version.clone(),
            description: header.description.clone().unwrap_or_default(),
            entry_count: header.entry_count,
            source,
        }
    }

    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (meta_keys::ENCODING, self.encoding.clone()),
            (meta_keys::TITLE, self.title.clone()),
            (meta_keys::VERSION, self.version.clone()),
            (meta_keys::DESCRIPTION, self.description.clone()),
            (meta_keys::ENTRY_COUNT, self.entry_count.to_string()),
            (meta_keys::SOURCE_PATH, self.source.path.clone()),
            (meta_keys::SOURCE_SIZE, self.source.size.to_string()),
            (meta_keys::SOURCE_MTIME, self.source.mtime_nanos.to_string()),
        ]
    }

    /// Describes the first field that differs from `expected`, if any.
    pub fn mismatch(&self, expected: &IndexMeta) -> Option<String> {
        let ours = self.to_pairs();
        let theirs = expected.to_pairs();
        ours.iter()
            .zip(theirs.iter())
            .find(|(a, b)| a.1 != b.1)
            .map(|(a, b)| format!("{} is '{}', expected '{}'", a.0, a.1, b.1))
    }
}

/// Everything stored in one side-car file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedIndex {
    pub meta: IndexMeta,
    /// Rows in on-disk key order.
    pub rows: Vec<IndexEntry>,
}

/// Where the index of an open container came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Loaded from a valid side-car file.
    Cache,
    /// Built by a full key scan during open.
    Built,
}
