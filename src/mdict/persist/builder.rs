//! Full key scan producing every [`IndexEntry`] of a container.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use super::schema::{canonical_path, IndexMeta, PersistedIndex, SourceFingerprint};
use crate::mdict::reader::MdictReader;
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::filetypes::FileType;
use crate::mdict::types::models::{IndexEntry, KeyEntry};

/// Callback receiving `(percent, message)` while an index is built.
pub type ProgressFn<'a> = dyn FnMut(u8, &str) + 'a;

/// Builds the complete index of `reader`.
///
/// Key blocks are decoded in file order. The first failure aborts the build
/// and is reported as [`MdictError::IndexBuild`]; no partial index is returned.
/// `progress` is invoked at most once per percent step.
pub fn build<T: FileType>(
    reader: &MdictReader<T>,
    source: SourceFingerprint,
    progress: &mut ProgressFn<'_>,
) -> Result<PersistedIndex> {
    let path = reader.path();
    let total_blocks = reader.key_blocks().len();
    info!(
        "Building {} index for {} ({} key blocks)",
        T::DEBUG_NAME,
        path.display(),
        total_blocks
    );

    let file_path: Arc<Path> = Arc::from(canonical_path(path));
    let mut scan = Scan {
        reader,
        file_path,
        block_tags: vec![None; reader.record_blocks().len()],
        rows: Vec::with_capacity(reader.num_entries() as usize),
    };

    progress(0, &format!("Indexing {} key blocks", total_blocks));
    let mut last_percent = 0u8;

    for (block_index, entries) in reader.iter_key_blocks() {
        scan.add_block(block_index, entries)
            .map_err(|source| MdictError::IndexBuild {
                path: path.to_path_buf(),
                block_index,
                source: Box::new(source),
            })?;

        let percent = ((block_index + 1) * 100 / total_blocks) as u8;
        if percent > last_percent {
            last_percent = percent;
            progress(
                percent,
                &format!("Indexed key block {}/{}", block_index + 1, total_blocks),
            );
        }
    }
    if last_percent < 100 {
        progress(100, "Index complete");
    }

    info!("Built index with {} rows", scan.rows.len());
    Ok(PersistedIndex {
        meta: IndexMeta::describe(reader.header(), source),
        rows: scan.rows,
    })
}

struct Scan<'a, T: FileType> {
    reader: &'a MdictReader<T>,
    file_path: Arc<Path>,
    /// Method tag of each record block, read on first use.
    block_tags: Vec<Option<u8>>,
    rows: Vec<IndexEntry>,
}

impl<T: FileType> Scan<'_, T> {
    fn add_block(&mut self, block_index: usize, entries: Result<Vec<KeyEntry>>) -> Result<()> {
        let entries = entries?;
        let declared = self.reader.key_blocks()[block_index].num_entries;
        if entries.len() as u64 != declared {
            return Err(MdictError::CountMismatch {
                item_type: format!("entries in key block {}", block_index),
                expected: declared,
                found: entries.len() as u64,
            });
        }
        debug!("Key block {}: {} entries", block_index, entries.len());

        for entry in entries {
            let record_index = self.reader.find_record_block(entry.id).ok_or(
                MdictError::OffsetOutOfRange {
                    offset: entry.id,
                    total: self.reader.total_record_size(),
                },
            )?;
            let record_block_type = self.block_tag(record_index)?;
            let block = self.reader.record_blocks()[record_index];

            self.rows.push(IndexEntry {
                key_text: entry.text,
                file_path: Arc::clone(&self.file_path),
                file_pos: block.file_offset,
                compressed_size: block.compressed_size,
                decompressed_size: block.decompressed_size,
                record_block_type,
                record_start: block.decompressed_offset,
                record_end: block.decompressed_end(),
                offset: entry.id,
            });
        }
        Ok(())
    }

    fn block_tag(&mut self, record_index: usize) -> Result<u8> {
        if let Some(tag) = self.block_tags[record_index] {
            return Ok(tag);
        }
        let tag = self.reader.record_block_tag(record_index)?;
        self.block_tags[record_index] = Some(tag);
        Ok(tag)
    }
}
