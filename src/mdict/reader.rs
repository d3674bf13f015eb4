use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};

use super::format;
use super::format::content::{self, BlockCipher};
use super::format::index::ContainerLayout;
use super::iter::KeyBlocks;
use super::types::error::{MdictError, Result};
use super::types::filetypes::FileType;
use super::types::models::*;

/// Low-level reader for one MDict container (.mdx or .mdd).
///
/// Opening parses the header and the block descriptor tables only; key and
/// record blocks are read on demand. The file handle sits behind a mutex so
/// the reader can be shared between threads.
#[derive(Debug)]
pub struct MdictReader<T: FileType> {
    path: PathBuf,
    file: Mutex<File>,
    file_len: u64,
    header: MdictHeader,
    layout: ContainerLayout,
    _file_type: PhantomData<T>,
}

impl<T: FileType> MdictReader<T> {
    /// Opens an MDict file.
    ///
    /// Priority for determining text encoding (highest → lowest):
    /// 1. `FileType::ENCODING_OVERRIDE` (MDD forces UTF-16LE)
    /// 2. `user_encoding` (explicit override provided by caller/CLI)
    /// 3. Encoding declared in the dictionary header
    ///
    /// # Errors
    /// - [`MdictError::FileNotFound`] if `path` does not exist
    /// - [`MdictError::MalformedHeader`] / [`MdictError::UnsupportedVersion`] for bad headers
    /// - [`MdictError::PasscodeRequired`] if the block info is encrypted and no passcode was given
    /// - [`MdictError::CorruptBlock`], [`MdictError::CountMismatch`] or
    ///   [`MdictError::TruncatedData`] for damaged descriptor tables
    pub fn open(
        path: impl AsRef<Path>,
        passcode: Option<(&str, &str)>,
        user_encoding: Option<TextEncoding>,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening {} file: {}", T::DEBUG_NAME, path.display());
        let mut file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MdictError::FileNotFound(path.to_path_buf()),
            _ => MdictError::Io(e),
        })?;
        let file_len = file.metadata()?.len();

        let forced = T::ENCODING_OVERRIDE.or(user_encoding);
        let (mut header, header_end) = format::header::parse(&mut file, file_len, passcode, forced)?;
        file.seek(SeekFrom::Start(header_end))?;

        let layout = format::index::parse(&mut file, file_len, &header)?;
        header.key_block_count = layout.key_blocks.len() as u64;
        header.entry_count = layout.entry_count;

        info!(
            "{} file opened: '{}' ({}, {}), {} entries in {} key / {} record blocks",
            T::DEBUG_NAME,
            header.title,
            header.version,
            header.encoding,
            header.entry_count,
            layout.key_blocks.len(),
            layout.record_blocks.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            file_len,
            header,
            layout,
            _file_type: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &MdictHeader {
        &self.header
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn key_blocks(&self) -> &[KeyBlockDescriptor] {
        &self.layout.key_blocks
    }

    pub fn record_blocks(&self) -> &[BlockMeta] {
        &self.layout.record_blocks
    }

    /// Size of the concatenated decompressed record stream.
    pub fn total_record_size(&self) -> u64 {
        self.layout.total_record_size
    }

    /// Returns the total number of entries declared by the key block info.
    pub fn num_entries(&self) -> u64 {
        self.layout.entry_count
    }

    /// Index of the record block holding logical `offset`, if any.
    pub fn find_record_block(&self, offset: u64) -> Option<usize> {
        self.layout.find_record_block(offset)
    }

    /// Iterates the decoded key blocks in file order.
    pub fn iter_key_blocks(&self) -> KeyBlocks<'_, T> {
        KeyBlocks::new(self)
    }

    pub(crate) fn read_key_block_entries(&self, block_index: usize) -> Result<Vec<KeyEntry>> {
        let block = BlockRef::new(BlockType::Key, block_index);
        let meta = self
            .layout
            .key_blocks
            .get(block_index)
            .map(|d| d.meta)
            .ok_or_else(|| MdictError::InvalidFormat(format!("Invalid {}", block)))?;
        let decompressed = self.read_and_decode_block(meta, block)?;
        content::parse_key_entries(&decompressed, self.header.version, self.header.encoding)
            .map_err(|e| e.within(block))
    }

    /// Reads and decodes a full record block given its index.
    pub fn read_record_block(&self, block_index: usize) -> Result<Vec<u8>> {
        let block = BlockRef::new(BlockType::Record, block_index);
        let meta = *self
            .layout
            .record_blocks
            .get(block_index)
            .ok_or_else(|| MdictError::InvalidFormat(format!("Invalid {}", block)))?;
        self.read_and_decode_block(meta, block)
    }

    /// Reads the method tag byte (low byte of the info word) of a record block.
    pub fn record_block_tag(&self, block_index: usize) -> Result<u8> {
        let block = BlockRef::new(BlockType::Record, block_index);
        let meta = self
            .layout
            .record_blocks
            .get(block_index)
            .ok_or_else(|| MdictError::InvalidFormat(format!("Invalid {}", block)))?;
        if meta.compressed_size < content::BLOCK_PREFIX_LEN as u64 {
            return Err(MdictError::corrupt(
                block,
                format!("Block too short: {} bytes", meta.compressed_size),
            ));
        }
        let mut file = self.file.lock().map_err(|_| MdictError::LockPoisoned)?;
        file.seek(SeekFrom::Start(meta.file_offset))?;
        let mut tag = [0u8; 1];
        file.read_exact(&mut tag)?;
        Ok(tag[0])
    }

    fn read_and_decode_block(&self, meta: BlockMeta, block: BlockRef) -> Result<Vec<u8>> {
        let mut raw_block = vec![0u8; meta.compressed_size as usize];
        {
            let mut file = self.file.lock().map_err(|_| MdictError::LockPoisoned)?;
            file.seek(SeekFrom::Start(meta.file_offset))?;
            file.read_exact(&mut raw_block)?;
        }

        content::decode_block(
            &mut raw_block,
            meta.decompressed_size,
            BlockCipher::Embedded {
                master_key: self.header.master_key,
            },
            block,
        )
    }
}
