//! Parser for MDict format versions 1.x and 2.x.

use std::io::{Read, Seek, SeekFrom};

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder};
use log::debug;

use super::{common, ContainerLayout};
use crate::mdict::codec::crypto;
use crate::mdict::format::content::{self, BlockCipher};
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{BlockRef, BlockType, MdictHeader, MdictVersion};
use crate::mdict::utils;

/// Numbers found in the key block info section.
#[derive(Debug)]
struct KeyBlockInfo {
    num_blocks: u64,
    num_entries: u64,
    /// Only present in v2.x; v1.x key indexes are stored uncompressed.
    key_index_decomp_len: Option<u64>,
    key_index_comp_len: u64,
    key_blocks_len: u64,
}

/// Main parser for v1/v2 files.
pub fn parse<R: Read + Seek>(
    file: &mut R,
    file_len: u64,
    header: &MdictHeader,
) -> Result<ContainerLayout> {
    let version = header.version;

    let info = read_key_block_info(file, file_len, header)?;
    debug!(
        "Key block info: blocks={}, entries={}, index_compressed={} bytes",
        info.num_blocks, info.num_entries, info.key_index_comp_len
    );

    let mut raw_index = read_section(file, file_len, info.key_index_comp_len, "key index")?;
    let index_data = match info.key_index_decomp_len {
        Some(decomp_len) => {
            let cipher = if header.encryption_flags.encrypt_key_index {
                debug!("Key index is encrypted, using checksum-derived key");
                BlockCipher::KeyIndex
            } else {
                BlockCipher::Embedded {
                    master_key: header.master_key,
                }
            };
            content::decode_block(
                &mut raw_index,
                decomp_len,
                cipher,
                BlockRef::new(BlockType::KeyIndex, 0),
            )?
        }
        None => raw_index,
    };

    let key_blocks_start = file.stream_position()?;
    let (key_blocks, total_entries) =
        common::read_key_block_descriptors(&index_data, version, header.encoding, key_blocks_start)
            .map_err(|e| e.within(BlockRef::new(BlockType::KeyIndex, 0)))?;

    check_count("key blocks", info.num_blocks, key_blocks.len() as u64)?;
    check_count("key entries", info.num_entries, total_entries)?;
    let key_bytes = key_blocks
        .iter()
        .try_fold(0u64, |acc, b| common::advance(acc, b.meta.compressed_size, "key block bytes"))?;
    check_count("key block bytes", info.key_blocks_len, key_bytes)?;

    let record_section = key_blocks_start
        .checked_add(info.key_blocks_len)
        .filter(|&end| end <= file_len)
        .ok_or(MdictError::TruncatedData {
            context: "key blocks",
            needed: info.key_blocks_len as usize,
            available: file_len.saturating_sub(key_blocks_start) as usize,
        })?;
    file.seek(SeekFrom::Start(record_section))?;

    let width = version.number_width();
    let record_info = read_section(file, file_len, 4 * width as u64, "record block info")?;
    let mut cursor = record_info.as_slice();
    let num_record_blocks = utils::read_number(&mut cursor, width, "record block count")?;
    let num_record_entries = utils::read_number(&mut cursor, width, "record entry count")?;
    let record_index_len = utils::read_number(&mut cursor, width, "record index length")?;
    let record_blocks_len = utils::read_number(&mut cursor, width, "record blocks length")?;
    check_count("record entries", info.num_entries, num_record_entries)?;

    let record_index = read_section(file, file_len, record_index_len, "record index")?;
    let record_blocks_start = file.stream_position()?;
    let record_blocks =
        common::read_record_block_descriptors(&record_index, version, record_blocks_start)?;
    check_count("record blocks", num_record_blocks, record_blocks.len() as u64)?;

    let record_bytes = record_blocks
        .iter()
        .try_fold(0u64, |acc, b| common::advance(acc, b.compressed_size, "record block bytes"))?;
    check_count("record block bytes", record_blocks_len, record_bytes)?;
    if record_blocks_start.saturating_add(record_blocks_len) > file_len {
        return Err(MdictError::TruncatedData {
            context: "record blocks",
            needed: record_blocks_len as usize,
            available: file_len.saturating_sub(record_blocks_start) as usize,
        });
    }

    let total_record_size = record_blocks
        .iter()
        .try_fold(0u64, |acc, b| common::advance(acc, b.decompressed_size, "record stream size"))?;
    debug!(
        "Layout parsed: {} key blocks, {} record blocks, {} entries",
        key_blocks.len(),
        record_blocks.len(),
        info.num_entries
    );

    Ok(ContainerLayout {
        key_blocks,
        record_blocks,
        total_record_size,
        entry_count: info.num_entries,
    })
}

fn read_key_block_info<R: Read + Seek>(
    file: &mut R,
    file_len: u64,
    header: &MdictHeader,
) -> Result<KeyBlockInfo> {
    let version = header.version;
    let width = version.number_width();
    let info_size = match version {
        MdictVersion::V1 => 4 * width,
        MdictVersion::V2 => 5 * width,
    };
    let mut info_bytes = read_section(file, file_len, info_size as u64, "key block info")?;

    if header.encryption_flags.encrypt_record_blocks {
        let key = header.master_key.ok_or(MdictError::PasscodeRequired)?;
        debug!("Decrypting key block info (Salsa20)");
        crypto::salsa_decrypt(&mut info_bytes, &key);
    }

    if version == MdictVersion::V2 {
        let checksum = read_section(file, file_len, 4, "key block info checksum")?;
        let expected = BigEndian::read_u32(&checksum);
        let actual = adler32_slice(&info_bytes);
        if expected != actual {
            return Err(MdictError::corrupt(
                BlockRef::new(BlockType::KeyInfo, 0),
                format!(
                    "Checksum mismatch: expected {:#010x}, computed {:#010x}",
                    expected, actual
                ),
            ));
        }
    }

    let mut cursor = info_bytes.as_slice();
    let num_blocks = utils::read_number(&mut cursor, width, "key block count")?;
    let num_entries = utils::read_number(&mut cursor, width, "key entry count")?;
    let key_index_decomp_len = match version {
        MdictVersion::V2 => Some(utils::read_number(&mut cursor, width, "key index size")?),
        MdictVersion::V1 => None,
    };
    let key_index_comp_len = utils::read_number(&mut cursor, width, "key index size")?;
    let key_blocks_len = utils::read_number(&mut cursor, width, "key blocks length")?;

    Ok(KeyBlockInfo {
        num_blocks,
        num_entries,
        key_index_decomp_len,
        key_index_comp_len,
        key_blocks_len,
    })
}

/// Reads `len` bytes at the current position, refusing lengths past the end of file.
fn read_section<R: Read + Seek>(
    file: &mut R,
    file_len: u64,
    len: u64,
    context: &'static str,
) -> Result<Vec<u8>> {
    let available = file_len.saturating_sub(file.stream_position()?);
    if len > available {
        return Err(MdictError::TruncatedData {
            context,
            needed: len as usize,
            available: available as usize,
        });
    }
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn check_count(item_type: &str, expected: u64, found: u64) -> Result<()> {
    if expected != found {
        return Err(MdictError::CountMismatch {
            item_type: item_type.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}
