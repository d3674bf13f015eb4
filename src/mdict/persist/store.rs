//! Reading and writing side-car index files.
//!
//! One [`IndexStore`] exists per container. Writes are crash-safe: the index
//! is written to `<sidecar>.tmp`, fsynced, then atomically renamed into place.

use std::collections::HashMap;
use std::fs::{self, rename, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use log::{debug, info};

use super::schema::{
    meta_keys, sidecar_path, IndexMeta, PersistedIndex, SourceFingerprint, COLUMNS, FOOTER_BYTES,
    INDEX_FORMAT_VERSION, INDEX_MAGIC,
};
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::IndexEntry;

/// Header magic (4) + format version (2).
const HEADER_BYTES: usize = 4 + 2;

/// Repository for the persisted index of one container.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

/// Result of [`IndexStore::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub path: PathBuf,
    pub exists: bool,
    pub format_version: Option<u16>,
    pub columns: Vec<String>,
    pub row_count: Option<u64>,
    /// True when the file is intact and uses the current format and columns.
    pub matches: bool,
    pub problem: Option<String>,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for the side-car of `source`, optionally placed in `cache_dir`.
    pub fn for_source(source: &Path, cache_dir: Option<&Path>) -> Self {
        Self::new(sidecar_path(source, cache_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the side-car if it is valid for `expected`.
    ///
    /// Returns `Ok(None)` when no side-car exists and [`MdictError::CacheFormat`]
    /// when one exists but must not be used.
    pub fn load(&self, expected: &IndexMeta) -> Result<Option<PersistedIndex>> {
        if !self.exists() {
            debug!("No side-car index at {}", self.path.display());
            return Ok(None);
        }
        let index = self.read()?;
        if let Some(reason) = index.meta.mismatch(expected) {
            return Err(MdictError::CacheFormat(format!("stale index: {}", reason)));
        }
        if index.rows.len() as u64 != expected.entry_count {
            return Err(MdictError::CacheFormat(format!(
                "index holds {} rows, container declares {} entries",
                index.rows.len(),
                expected.entry_count
            )));
        }
        debug!(
            "Loaded side-car index {} ({} rows)",
            self.path.display(),
            index.rows.len()
        );
        Ok(Some(index))
    }

    /// Reads and fully validates the side-car, without comparing it to a source.
    pub fn read(&self) -> Result<PersistedIndex> {
        let bytes = fs::read(&self.path)?;
        let body = verify_frame(&bytes)?;
        let mut cursor = body;

        let format_version = read_preamble(&mut cursor)?;
        if format_version != INDEX_FORMAT_VERSION {
            return Err(MdictError::CacheFormat(format!(
                "format version {} (expected {})",
                format_version, INDEX_FORMAT_VERSION
            )));
        }
        let columns = read_schema(&mut cursor)?;
        if columns != COLUMNS {
            return Err(MdictError::CacheFormat(format!(
                "schema mismatch: found columns [{}]",
                columns.join(", ")
            )));
        }
        let meta = read_meta(&mut cursor)?;
        let paths = read_paths(&mut cursor)?;
        let rows = read_rows(&mut cursor, &paths)?;
        if !cursor.is_empty() {
            return Err(MdictError::CacheFormat(format!(
                "{} unexpected bytes after rows",
                cursor.len()
            )));
        }
        Ok(PersistedIndex { meta, rows })
    }

    /// Writes `index`, replacing any existing side-car atomically.
    pub fn save(&self, index: &PersistedIndex) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension(format!(
            "{}.tmp",
            self.path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));

        let written = write_file(&tmp_path, index).and_then(|_| Ok(rename(&tmp_path, &self.path)?));
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written?;

        info!(
            "Saved side-car index {} ({} rows)",
            self.path.display(),
            index.rows.len()
        );
        Ok(())
    }

    /// Diagnoses the side-car without requiring it to be valid.
    pub fn inspect(&self) -> Result<SchemaReport> {
        let mut report = SchemaReport {
            path: self.path.clone(),
            exists: self.exists(),
            format_version: None,
            columns: Vec::new(),
            row_count: None,
            matches: false,
            problem: None,
        };
        if !report.exists {
            return Ok(report);
        }

        let bytes = fs::read(&self.path)?;
        let body = match verify_frame(&bytes) {
            Ok(body) => body,
            Err(e) => {
                report.problem = Some(e.to_string());
                // Still try to show what the file claims to be.
                &bytes[..bytes.len().saturating_sub(FOOTER_BYTES)]
            }
        };

        let mut cursor = body;
        let outcome = (|| -> Result<()> {
            report.format_version = Some(read_preamble(&mut cursor)?);
            report.columns = read_schema(&mut cursor)?;
            read_meta_pairs(&mut cursor)?;
            read_paths(&mut cursor)?;
            report.row_count = Some(cursor.read_u64::<LittleEndian>().map_err(truncated)?);
            Ok(())
        })();
        if let Err(e) = outcome {
            report.problem.get_or_insert(e.to_string());
        }

        report.matches = report.problem.is_none()
            && report.format_version == Some(INDEX_FORMAT_VERSION)
            && report.columns == COLUMNS;
        Ok(report)
    }
}

/// Write adapter that checksums everything passing through it.
struct CrcWriter<W: Write> {
    inner: W,
    hasher: Crc32,
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn write_file(tmp_path: &Path, index: &PersistedIndex) -> Result<()> {
    let raw_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp_path)?;
    let mut w = CrcWriter {
        inner: BufWriter::new(raw_file),
        hasher: Crc32::new(),
    };

    w.write_u32::<LittleEndian>(INDEX_MAGIC)?;
    w.write_u16::<LittleEndian>(INDEX_FORMAT_VERSION)?;

    w.write_u16::<LittleEndian>(COLUMNS.len() as u16)?;
    for column in COLUMNS {
        w.write_u8(column.len() as u8)?;
        w.write_all(column.as_bytes())?;
    }

    let pairs = index.meta.to_pairs();
    w.write_u16::<LittleEndian>(pairs.len() as u16)?;
    for (key, value) in &pairs {
        w.write_u16::<LittleEndian>(key.len() as u16)?;
        w.write_all(key.as_bytes())?;
        w.write_u32::<LittleEndian>(value.len() as u32)?;
        w.write_all(value.as_bytes())?;
    }

    let mut path_ids: HashMap<&Path, u16> = HashMap::new();
    let mut paths: Vec<&Path> = Vec::new();
    for row in &index.rows {
        if !path_ids.contains_key(&*row.file_path) {
            let id = u16::try_from(paths.len())
                .map_err(|_| MdictError::CacheFormat("too many distinct file paths".to_string()))?;
            path_ids.insert(&*row.file_path, id);
            paths.push(&*row.file_path);
        }
    }
    w.write_u16::<LittleEndian>(paths.len() as u16)?;
    for path in &paths {
        let text = path.to_string_lossy();
        let len = u16::try_from(text.len())
            .map_err(|_| MdictError::CacheFormat("file path too long".to_string()))?;
        w.write_u16::<LittleEndian>(len)?;
        w.write_all(text.as_bytes())?;
    }

    w.write_u64::<LittleEndian>(index.rows.len() as u64)?;
    for row in &index.rows {
        w.write_u32::<LittleEndian>(row.key_text.len() as u32)?;
        w.write_all(row.key_text.as_bytes())?;
        w.write_u16::<LittleEndian>(path_ids[&*row.file_path])?;
        w.write_u64::<LittleEndian>(row.file_pos)?;
        w.write_u64::<LittleEndian>(row.compressed_size)?;
        w.write_u64::<LittleEndian>(row.decompressed_size)?;
        w.write_u8(row.record_block_type)?;
        w.write_u64::<LittleEndian>(row.record_start)?;
        w.write_u64::<LittleEndian>(row.record_end)?;
        w.write_u64::<LittleEndian>(row.offset)?;
    }

    let crc = w.hasher.finalize();
    let mut file = w.inner;
    file.write_u32::<LittleEndian>(crc)?;
    file.write_u32::<LittleEndian>(INDEX_MAGIC)?;

    file.flush()?;
    file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

/// Checks footer magic and CRC, returning the checksummed body.
fn verify_frame(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < HEADER_BYTES + FOOTER_BYTES {
        return Err(MdictError::CacheFormat(format!(
            "file too short ({} bytes)",
            bytes.len()
        )));
    }
    let (body, footer) = bytes.split_at(bytes.len() - FOOTER_BYTES);
    let stored_crc = LittleEndian::read_u32(&footer[0..4]);
    let magic = LittleEndian::read_u32(&footer[4..8]);
    if magic != INDEX_MAGIC {
        return Err(MdictError::CacheFormat(format!("bad footer magic {:#010x}", magic)));
    }
    let mut hasher = Crc32::new();
    hasher.update(body);
    let actual = hasher.finalize();
    if actual != stored_crc {
        return Err(MdictError::CacheFormat(format!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, actual
        )));
    }
    Ok(body)
}

fn truncated(_: io::Error) -> MdictError {
    MdictError::CacheFormat("truncated index file".to_string())
}

fn read_bytes<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if cursor.len() < len {
        return Err(MdictError::CacheFormat("truncated index file".to_string()));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

fn read_string(cursor: &mut &[u8], len: usize) -> Result<String> {
    let raw = read_bytes(cursor, len)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| MdictError::CacheFormat("invalid UTF-8 in index file".to_string()))
}

fn read_preamble(cursor: &mut &[u8]) -> Result<u16> {
    let magic = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    if magic != INDEX_MAGIC {
        return Err(MdictError::CacheFormat(format!("bad header magic {:#010x}", magic)));
    }
    cursor.read_u16::<LittleEndian>().map_err(truncated)
}

fn read_schema(cursor: &mut &[u8]) -> Result<Vec<String>> {
    let count = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    (0..count)
        .map(|_| {
            let len = cursor.read_u8().map_err(truncated)? as usize;
            read_string(cursor, len)
        })
        .collect()
}

fn read_meta_pairs(cursor: &mut &[u8]) -> Result<HashMap<String, String>> {
    let count = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let mut pairs = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let key_len = cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize;
        let key = read_string(cursor, key_len)?;
        let value_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let value = read_string(cursor, value_len)?;
        pairs.insert(key, value);
    }
    Ok(pairs)
}

fn read_meta(cursor: &mut &[u8]) -> Result<IndexMeta> {
    let mut pairs = read_meta_pairs(cursor)?;
    let mut take = |key: &str| {
        pairs
            .remove(key)
            .ok_or_else(|| MdictError::CacheFormat(format!("missing metadata '{}'", key)))
    };
    let number = |key: &str, value: String| {
        value
            .parse::<u128>()
            .map_err(|_| MdictError::CacheFormat(format!("metadata '{}' is not a number", key)))
    };

    let encoding = take(meta_keys::ENCODING)?;
    let title = take(meta_keys::TITLE)?;
    let version = take(meta_keys::VERSION)?;
    let description = take(meta_keys::DESCRIPTION)?;
    let entry_count = number(meta_keys::ENTRY_COUNT, take(meta_keys::ENTRY_COUNT)?)? as u64;
    let path = take(meta_keys::SOURCE_PATH)?;
    let size = number(meta_keys::SOURCE_SIZE, take(meta_keys::SOURCE_SIZE)?)? as u64;
    let mtime_nanos = number(meta_keys::SOURCE_MTIME, take(meta_keys::SOURCE_MTIME)?)?;

    Ok(IndexMeta {
        encoding,
        title,
        version,
        description,
        entry_count,
        source: SourceFingerprint {
            path,
            size,
            mtime_nanos,
        },
    })
}

fn read_paths(cursor: &mut &[u8]) -> Result<Vec<Arc<Path>>> {
    let count = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    (0..count)
        .map(|_| {
            let len = cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize;
            let text = read_string(cursor, len)?;
            Ok(Arc::from(PathBuf::from(text)))
        })
        .collect()
}

fn read_rows(cursor: &mut &[u8], paths: &[Arc<Path>]) -> Result<Vec<IndexEntry>> {
    let count = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
    // Smallest possible row is 4 + 2 + 7 * 8 + 1 bytes.
    if count > (cursor.len() / 63) as u64 {
        return Err(MdictError::CacheFormat(format!(
            "row count {} exceeds file size",
            count
        )));
    }

    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let key_text = read_string(cursor, key_len)?;
        let path_id = cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize;
        let file_path = paths
            .get(path_id)
            .cloned()
            .ok_or_else(|| MdictError::CacheFormat(format!("unknown path id {}", path_id)))?;
        let row = IndexEntry {
            key_text,
            file_path,
            file_pos: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
            compressed_size: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
            decompressed_size: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
            record_block_type: cursor.read_u8().map_err(truncated)?,
            record_start: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
            record_end: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
            offset: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
        };
        let consistent = row.record_start <= row.offset
            && row.offset < row.record_end
            && row.record_end - row.record_start == row.decompressed_size;
        if !consistent {
            return Err(MdictError::CacheFormat(format!(
                "row '{}' has inconsistent offsets",
                row.key_text
            )));
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn sample_index(dir: &Path) -> PersistedIndex {
        let source: Arc<Path> = Arc::from(dir.join("dict.mdx"));
        let row = |key: &str, offset: u64| IndexEntry {
            key_text: key.to_string(),
            file_path: Arc::clone(&source),
            file_pos: 120,
            compressed_size: 48,
            decompressed_size: 40,
            record_block_type: 2,
            record_start: 0,
            record_end: 40,
            offset,
        };
        PersistedIndex {
            meta: IndexMeta {
                encoding: "UTF-8".into(),
                title: "Sample".into(),
                version: "2.0".into(),
                description: String::new(),
                entry_count: 2,
                source: SourceFingerprint {
                    path: source.to_string_lossy().into_owned(),
                    size: 1000,
                    mtime_nanos: 1_700_000_000_123_456_789,
                },
            },
            rows: vec![row("apple", 0), row("pear", 17)],
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());
        let store = IndexStore::new(dir.path().join("dict.mdx.idx"));
        store.save(&index).unwrap();

        let loaded = store.load(&index.meta).unwrap().unwrap();
        assert_eq!(loaded, index);
        assert!(!dir.path().join("dict.mdx.idx.tmp").exists());
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());
        let store = IndexStore::new(dir.path().join("absent.idx"));
        assert!(store.load(&index.meta).unwrap().is_none());
    }

    #[test]
    fn stale_fingerprint_is_rejected() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());
        let store = IndexStore::new(dir.path().join("dict.mdx.idx"));
        store.save(&index).unwrap();

        let mut expected = index.meta.clone();
        expected.source.mtime_nanos += 1;
        assert!(matches!(
            store.load(&expected),
            Err(MdictError::CacheFormat(_))
        ));
    }

    #[test]
    fn flipped_byte_fails_crc() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());
        let store = IndexStore::new(dir.path().join("dict.mdx.idx"));
        store.save(&index).unwrap();

        let mut bytes = fs::read(store.path()).unwrap();
        bytes[20] ^= 0x40;
        fs::write(store.path(), &bytes).unwrap();
        assert!(matches!(store.read(), Err(MdictError::CacheFormat(_))));

        let report = store.inspect().unwrap();
        assert!(report.exists);
        assert!(!report.matches);
        assert!(report.problem.is_some());
    }

    #[test]
    fn inspect_reports_columns() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());
        let store = IndexStore::new(dir.path().join("dict.mdx.idx"));
        store.save(&index).unwrap();

        let report = store.inspect().unwrap();
        assert!(report.matches);
        assert_eq!(report.row_count, Some(2));
        assert_eq!(report.columns, COLUMNS);
        assert_eq!(report.format_version, Some(INDEX_FORMAT_VERSION));
    }

    #[test]
    fn inspect_missing_file() {
        let dir = tempdir().unwrap();
        let report = IndexStore::new(dir.path().join("none.idx")).inspect().unwrap();
        assert!(!report.exists);
        assert!(!report.matches);
    }
}
