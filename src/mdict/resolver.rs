//! Maps index rows to record payloads.

use log::trace;

use super::block_cache::BlockCache;
use super::reader::MdictReader;
use super::types::error::{MdictError, Result};
use super::types::filetypes::{FileType, RecordData};
use super::types::models::IndexEntry;

/// Reads record payloads of one container through its block cache.
#[derive(Debug)]
pub struct RecordResolver<T: FileType> {
    reader: MdictReader<T>,
    cache: BlockCache,
}

impl<T: FileType> RecordResolver<T> {
    pub fn new(reader: MdictReader<T>, cache_capacity: usize) -> Self {
        Self {
            reader,
            cache: BlockCache::new(cache_capacity),
        }
    }

    pub fn reader(&self) -> &MdictReader<T> {
        &self.reader
    }

    /// Raw payload bytes of `entry`, ending at `span_end` in the logical record stream.
    ///
    /// Fails with [`MdictError::OffsetOutOfRange`] when the row does not agree
    /// with the container's record block table.
    pub fn fetch(&self, entry: &IndexEntry, span_end: u64) -> Result<Vec<u8>> {
        let out_of_range = || MdictError::OffsetOutOfRange {
            offset: entry.offset,
            total: self.reader.total_record_size(),
        };

        let block_index = self
            .reader
            .find_record_block(entry.offset)
            .ok_or_else(out_of_range)?;
        let block = self.reader.record_blocks()[block_index];
        let agrees = block.file_offset == entry.file_pos
            && block.compressed_size == entry.compressed_size
            && block.decompressed_size == entry.decompressed_size
            && block.decompressed_offset == entry.record_start;
        if !agrees || span_end <= entry.offset || span_end > block.decompressed_end() {
            return Err(out_of_range());
        }

        let data = self
            .cache
            .get_or_load(block_index, || self.reader.read_record_block(block_index))?;
        let start = (entry.offset - block.decompressed_offset) as usize;
        let end = (span_end - block.decompressed_offset) as usize;
        trace!(
            "Slicing record '{}' from block {} [{}..{}]",
            entry.key_text,
            block_index,
            start,
            end
        );
        Ok(data[start..end].to_vec())
    }

    /// Payload of `entry` processed for this file type.
    pub fn resolve(&self, entry: &IndexEntry, span_end: u64) -> Result<RecordData<T::Record>> {
        let bytes = self.fetch(entry, span_end)?;
        Ok(T::process_record(&bytes, self.reader.header().encoding))
    }
}
