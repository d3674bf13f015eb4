//! Core data structures for MDict format components.
//!
//! This module defines the fundamental types used throughout the library:
//! - File metadata and headers
//! - Block descriptors and index entries
//! - Version, encoding and codec enumerations

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use encoding_rs::{Encoding, GB18030, UTF_16LE, UTF_8};
use log::warn;

use super::error::{MdictError, Result};

/// Encryption flags parsed from the MDict header.
///
/// The MDict format uses a bitmask to indicate which parts of the file are encrypted:
/// - Bit 0x01: Record data blocks (and the key block info) are encrypted
/// - Bit 0x02: Key index blocks are encrypted
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionFlags {
    pub encrypt_record_blocks: bool,
    pub encrypt_key_index: bool,
}

impl EncryptionFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            encrypt_record_blocks: (bits & 0x01) != 0,
            encrypt_key_index: (bits & 0x02) != 0,
        }
    }
}

/// Text encoding of keys and (for MDX) record payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// Always little-endian in MDict containers.
    Utf16,
    /// GBK and GB2312 labels; decoded with the GB18030 superset.
    Gbk,
    /// Any other single/multi-byte legacy encoding known to `encoding_rs` (Big5, Shift_JIS, ...).
    Legacy(&'static Encoding),
}

impl TextEncoding {
    /// Maps a header `Encoding` attribute to an encoding.
    ///
    /// An empty label means UTF-8. Unknown labels fall back to UTF-8 with a warning.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() {
            return TextEncoding::Utf8;
        }
        match label.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => return TextEncoding::Utf8,
            "UTF-16" | "UTF16" | "UTF-16LE" => return TextEncoding::Utf16,
            "GBK" | "GB2312" | "GB18030" => return TextEncoding::Gbk,
            _ => {}
        }
        match Encoding::for_label(label.as_bytes()) {
            Some(enc) if enc == UTF_8 => TextEncoding::Utf8,
            Some(enc) if enc == UTF_16LE => TextEncoding::Utf16,
            Some(enc) if enc == GB18030 || enc == encoding_rs::GBK => TextEncoding::Gbk,
            Some(enc) => TextEncoding::Legacy(enc),
            None => {
                warn!("Unknown text encoding label '{}', falling back to UTF-8", label);
                TextEncoding::Utf8
            }
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8 => UTF_8,
            TextEncoding::Utf16 => UTF_16LE,
            TextEncoding::Gbk => GB18030,
            TextEncoding::Legacy(enc) => enc,
        }
    }

    /// Width in bytes of one code unit (and of a NUL terminator).
    pub fn unit_width(&self) -> usize {
        match self {
            TextEncoding::Utf16 => 2,
            _ => 1,
        }
    }

    /// Decodes bytes, replacing malformed sequences.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, _) = self.encoding().decode_without_bom_handling(bytes);
        text.into_owned()
    }

    /// Stable label stored in the side-car index metadata.
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16 => "UTF-16LE",
            TextEncoding::Gbk => "GBK",
            TextEncoding::Legacy(enc) => enc.name(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Complete parsed header from an MDict file.
///
/// The XML attributes are parsed by [`format::header`](crate::mdict::format::header);
/// `key_block_count` and `entry_count` are filled in once the key block info
/// section has been read, so the header is complete when the container is open.
#[derive(Debug, Clone)]
pub struct MdictHeader {
    pub version: MdictVersion,
    /// Raw `GeneratedByEngineVersion` attribute, e.g. `"2.0"`.
    pub engine_version: String,
    pub encryption_flags: EncryptionFlags,
    pub encoding: TextEncoding,
    pub title: String,
    pub description: Option<String>,
    /// Raw `StyleSheet` attribute. Kept as metadata; never applied to records.
    pub stylesheet: Option<String>,
    pub key_block_count: u64,
    pub entry_count: u64,
    /// Master decryption key derived from the configured passcode.
    /// `None` if no credentials were provided.
    pub master_key: Option<[u8; 16]>,
}

/// A single key entry decoded from a key block.
///
/// `id` is the key's offset in the virtual concatenated decompressed record stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub id: u64,
    pub text: String,
}

/// Metadata describing a single compressed data block.
///
/// Record blocks are described by this type alone (the record block descriptor table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    /// Size of the block as stored in the file, including its 8-byte prefix.
    pub compressed_size: u64,
    /// Size of the block after decompression (bytes).
    pub decompressed_size: u64,
    /// Absolute byte offset where this block's compressed data begins in the file.
    pub file_offset: u64,
    /// Offset of this block in the virtual concatenated decompressed stream.
    /// The first block has offset 0.
    pub decompressed_offset: u64,
}

impl BlockMeta {
    /// Logical end (exclusive) of this block in the decompressed stream.
    pub fn decompressed_end(&self) -> u64 {
        self.decompressed_offset + self.decompressed_size
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.decompressed_offset && offset < self.decompressed_end()
    }
}

/// One row of the key block descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlockDescriptor {
    pub meta: BlockMeta,
    pub num_entries: u64,
    pub first_key: String,
    pub last_key: String,
}

/// One row of the persisted index: where a key's payload lives on disk.
///
/// `record_start..record_end` is the containing record block's range in the
/// logical record stream and `offset` is the key's own position in it, so
/// `record_start <= offset < record_end` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key_text: String,
    pub file_path: Arc<Path>,
    /// File offset of the compressed record block.
    pub file_pos: u64,
    pub compressed_size: u64,
    pub decompressed_size: u64,
    /// Raw method tag byte of the record block (compression nibble | encryption nibble << 4).
    pub record_block_type: u8,
    pub record_start: u64,
    pub record_end: u64,
    pub offset: u64,
}

impl IndexEntry {
    /// Position of this key's payload inside the decompressed record block.
    pub fn offset_in_block(&self) -> u64 {
        self.offset - self.record_start
    }
}

/// Format version of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdictVersion {
    /// Legacy 1.x layout: 4-byte numbers, uncompressed key index.
    V1,
    /// Current 2.x layout: 8-byte numbers, compressed and checksummed key index.
    V2,
}

impl MdictVersion {
    /// Returns the byte width for numeric fields in this MDict version.
    pub fn number_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 4,
            MdictVersion::V2 => 8,
        }
    }

    /// Returns the byte width for text length prefixes in this MDict version.
    pub fn small_number_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 1,
            MdictVersion::V2 => 2,
        }
    }

    /// Number of terminator units following length-prefixed key text.
    pub fn text_terminator_units(&self) -> usize {
        match self {
            MdictVersion::V1 => 0,
            MdictVersion::V2 => 1,
        }
    }
}

impl TryFrom<f32> for MdictVersion {
    type Error = MdictError;
    fn try_from(v: f32) -> Result<Self> {
        if v < 2.0 {
            Ok(Self::V1)
        } else if v < 3.0 {
            Ok(Self::V2)
        } else {
            Err(MdictError::UnsupportedVersion(v))
        }
    }
}

impl fmt::Display for MdictVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdictVersion::V1 => write!(f, "1.x"),
            MdictVersion::V2 => write!(f, "2.x"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    KeyInfo,
    KeyIndex,
    Key,
    Record,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockType::KeyInfo => write!(f, "key info"),
            BlockType::KeyIndex => write!(f, "key index"),
            BlockType::Key => write!(f, "key"),
            BlockType::Record => write!(f, "record"),
        }
    }
}

/// Identifies a block in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub kind: BlockType,
    pub index: usize,
}

impl BlockRef {
    pub fn new(kind: BlockType, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} block {}", self.kind, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lzo,
    Zlib,
}

impl TryFrom<u8> for CompressionType {
    type Error = MdictError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Lzo),
            2 => Ok(Self::Zlib),
            _ => Err(MdictError::InvalidFormat(format!("Unknown compression type: {}", value))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    None,
    Fast,
    Salsa20,
}

impl TryFrom<u8> for EncryptionType {
    type Error = MdictError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Fast),
            2 => Ok(Self::Salsa20),
            _ => Err(MdictError::InvalidFormat(format!("Unknown encryption type: {}", value))),
        }
    }
}
