//! Descriptor table decoding shared by the key and record sections.

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{BlockMeta, KeyBlockDescriptor, MdictVersion, TextEncoding};
use crate::mdict::utils;

/// Decodes the key block descriptor table from the (decompressed) key index.
///
/// Returns the descriptors and the sum of their entry counts.
pub fn read_key_block_descriptors(
    index_data: &[u8],
    version: MdictVersion,
    encoding: TextEncoding,
    first_block_offset: u64,
) -> Result<(Vec<KeyBlockDescriptor>, u64)> {
    let width = version.number_width();
    let mut cursor = index_data;
    let mut descriptors = Vec::new();
    let mut total_entries = 0u64;
    let mut file_offset = first_block_offset;
    let mut decompressed_offset = 0u64;

    while !cursor.is_empty() {
        let num_entries = utils::read_number(&mut cursor, width, "key block entry count")?;
        let first_key = utils::read_prefixed_text(&mut cursor, version, encoding, "key block first key")?;
        let last_key = utils::read_prefixed_text(&mut cursor, version, encoding, "key block last key")?;
        let compressed_size = utils::read_number(&mut cursor, width, "key block compressed size")?;
        let decompressed_size = utils::read_number(&mut cursor, width, "key block decompressed size")?;

        descriptors.push(KeyBlockDescriptor {
            meta: BlockMeta {
                compressed_size,
                decompressed_size,
                file_offset,
                decompressed_offset,
            },
            num_entries,
            first_key,
            last_key,
        });
        total_entries = advance(total_entries, num_entries, "key entry count")?;
        file_offset = advance(file_offset, compressed_size, "key block offset")?;
        decompressed_offset = advance(decompressed_offset, decompressed_size, "key stream offset")?;
    }

    Ok((descriptors, total_entries))
}

/// Decodes the record block descriptor table: `(compressed, decompressed)` size pairs.
pub fn read_record_block_descriptors(
    index_data: &[u8],
    version: MdictVersion,
    first_block_offset: u64,
) -> Result<Vec<BlockMeta>> {
    let width = version.number_width();
    let mut cursor = index_data;
    let mut blocks = Vec::new();
    let mut file_offset = first_block_offset;
    let mut decompressed_offset = 0u64;

    while !cursor.is_empty() {
        let compressed_size = utils::read_number(&mut cursor, width, "record block compressed size")?;
        let decompressed_size = utils::read_number(&mut cursor, width, "record block decompressed size")?;
        blocks.push(BlockMeta {
            compressed_size,
            decompressed_size,
            file_offset,
            decompressed_offset,
        });
        file_offset = advance(file_offset, compressed_size, "record block offset")?;
        decompressed_offset = advance(decompressed_offset, decompressed_size, "record stream offset")?;
    }

    Ok(blocks)
}

/// Running totals come straight from the file, so they may not fit.
pub(crate) fn advance(total: u64, step: u64, what: &str) -> Result<u64> {
    total
        .checked_add(step)
        .ok_or_else(|| MdictError::InvalidFormat(format!("{} overflows: {} + {}", what, total, step)))
}
