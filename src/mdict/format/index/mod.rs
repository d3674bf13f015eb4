//! # Index Parsing
//!
//! Entry point for parsing the key and record block descriptor tables of an
//! MDict file. Only descriptor tables are read here; key blocks themselves are
//! decoded later, by the index builder.

use std::io::{Read, Seek};

use crate::mdict::types::error::Result;
use crate::mdict::types::models::{BlockMeta, KeyBlockDescriptor, MdictHeader};

pub mod common;
pub mod v1v2;

/// Block layout of an opened container.
#[derive(Debug, Clone)]
pub struct ContainerLayout {
    pub key_blocks: Vec<KeyBlockDescriptor>,
    pub record_blocks: Vec<BlockMeta>,
    /// Sum of all decompressed record block sizes.
    pub total_record_size: u64,
    pub entry_count: u64,
}

impl ContainerLayout {
    /// Binary search for the record block holding `offset` in the logical record stream.
    pub fn find_record_block(&self, offset: u64) -> Option<usize> {
        let idx = self
            .record_blocks
            .partition_point(|b| b.decompressed_offset <= offset);
        if idx == 0 {
            return None;
        }
        let candidate = idx - 1;
        self.record_blocks[candidate].contains(offset).then_some(candidate)
    }
}

/// Parses the descriptor tables that follow the header.
///
/// `file` must be positioned right after the header block.
pub fn parse<R: Read + Seek>(
    file: &mut R,
    file_len: u64,
    header: &MdictHeader,
) -> Result<ContainerLayout> {
    v1v2::parse(file, file_len, header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(sizes: &[u64]) -> ContainerLayout {
        let mut record_blocks = Vec::new();
        let mut offset = 0;
        for &size in sizes {
            record_blocks.push(BlockMeta {
                compressed_size: size + 8,
                decompressed_size: size,
                file_offset: 0,
                decompressed_offset: offset,
            });
            offset += size;
        }
        ContainerLayout {
            key_blocks: Vec::new(),
            record_blocks,
            total_record_size: offset,
            entry_count: 0,
        }
    }

    #[test]
    fn finds_block_for_offsets() {
        let layout = layout(&[10, 5, 20]);
        assert_eq!(layout.find_record_block(0), Some(0));
        assert_eq!(layout.find_record_block(9), Some(0));
        assert_eq!(layout.find_record_block(10), Some(1));
        assert_eq!(layout.find_record_block(15), Some(2));
        assert_eq!(layout.find_record_block(34), Some(2));
        assert_eq!(layout.find_record_block(35), None);
    }

    #[test]
    fn empty_blocks_are_skipped() {
        let layout = layout(&[4, 0, 4]);
        assert_eq!(layout.find_record_block(4), Some(2));
    }
}
