//! # Block Content Decoding
//!
//! This module is responsible for taking a raw, on-disk block and turning it
//! into plain bytes or structured key entries. It sits between the high-level
//! `reader` (which handles I/O) and the low-level `codec` (which handles pure
//! data transformation).
//!
//! ## Responsibilities
//! 1.  **Parse Block Prefix**: Reads the 8-byte prefix to determine compression,
//!     encryption, and checksum information.
//! 2.  **Decode Payload**: Orchestrates decryption and decompression by calling
//!     the `codec` module.
//! 3.  **Verify**: Validates the decompressed size and checksum.
//! 4.  **Parse Entries**: Splits a decompressed key block into `KeyEntry` values.

use std::cmp::min;

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::trace;

use crate::mdict::codec::{compression, crypto};
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::*;
use crate::mdict::utils;

/// Size of the `[info][checksum]` prefix in front of every compressed block.
pub const BLOCK_PREFIX_LEN: usize = 8;

/// How a block's payload is deciphered, chosen once per block.
#[derive(Debug, Clone, Copy)]
pub enum BlockCipher {
    /// Key index of a file whose header sets the key-index encryption bit:
    /// the whole payload is fast-XOR encrypted with a checksum-derived key.
    KeyIndex,
    /// The block's own encryption nibble applies, keyed by the master key
    /// if one was derived, else by the block checksum.
    Embedded { master_key: Option<[u8; 16]> },
}

/// Parsed `[u32 LE info][u32 BE adler32]` block prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPrefix {
    pub compression: CompressionType,
    pub encryption: EncryptionType,
    /// Number of leading payload bytes covered by the embedded cipher.
    pub encrypted_len: usize,
    pub checksum: u32,
}

impl BlockPrefix {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < BLOCK_PREFIX_LEN {
            return Err(MdictError::InvalidFormat(format!(
                "Block too short: {} bytes, prefix needs {}",
                raw.len(),
                BLOCK_PREFIX_LEN
            )));
        }
        let info = LittleEndian::read_u32(&raw[0..4]);
        Ok(Self {
            compression: CompressionType::try_from((info & 0xF) as u8)?,
            encryption: EncryptionType::try_from(((info >> 4) & 0xF) as u8)?,
            encrypted_len: ((info >> 8) & 0xFF) as usize,
            checksum: BigEndian::read_u32(&raw[4..8]),
        })
    }
}

/// Decodes a raw, compressed/encrypted block (prefix included).
///
/// Every failure is reported as [`MdictError::CorruptBlock`] naming `block`.
pub fn decode_block(
    raw_block: &mut [u8],
    expected_decompressed_size: u64,
    cipher: BlockCipher,
    block: BlockRef,
) -> Result<Vec<u8>> {
    decode_block_inner(raw_block, expected_decompressed_size, cipher).map_err(|e| e.within(block))
}

fn decode_block_inner(
    raw_block: &mut [u8],
    expected_decompressed_size: u64,
    cipher: BlockCipher,
) -> Result<Vec<u8>> {
    let prefix = BlockPrefix::parse(raw_block)?;
    trace!(
        "Decoding block: {:?}, cipher={:?}, expected_size={} bytes",
        prefix,
        cipher,
        expected_decompressed_size
    );

    let (checksum_bytes, payload) = raw_block.split_at_mut(BLOCK_PREFIX_LEN);
    let checksum_bytes = &checksum_bytes[4..8];

    match cipher {
        BlockCipher::KeyIndex => {
            let key = crypto::derive_key_index_key(checksum_bytes);
            crypto::fast_decrypt(payload, &key);
        }
        BlockCipher::Embedded { master_key } => {
            if prefix.encryption != EncryptionType::None {
                let key = master_key.unwrap_or_else(|| crypto::derive_block_key(checksum_bytes));
                let decrypt_len = min(prefix.encrypted_len, payload.len());
                crypto::decrypt_payload_in_place(&mut payload[..decrypt_len], prefix.encryption, &key);
            }
        }
    }

    let decompressed =
        compression::decompress_payload(payload, prefix.compression, expected_decompressed_size)?;

    let checksum_actual = adler32_slice(&decompressed);
    if checksum_actual != prefix.checksum {
        return Err(MdictError::InvalidFormat(format!(
            "Checksum mismatch: expected {:#010x}, computed {:#010x}",
            prefix.checksum, checksum_actual
        )));
    }

    Ok(decompressed)
}

/// Parses key entries from a decompressed key block.
///
/// Each entry is a record offset followed by NUL-terminated key text.
pub fn parse_key_entries(
    data: &[u8],
    version: MdictVersion,
    encoding: TextEncoding,
) -> Result<Vec<KeyEntry>> {
    let mut entries = Vec::new();
    let mut cursor = data;

    while !cursor.is_empty() {
        let id = utils::read_number(&mut cursor, version.number_width(), "key entry offset")?;
        let text = utils::read_null_terminated_text(&mut cursor, encoding, "key entry text")?;
        entries.push(KeyEntry { id, text });
    }

    Ok(entries)
}
