//! Iterators for sequential access to MDict keys.
//!
//! 1. [`KeyBlocks`] - decodes key blocks from the container in file order
//!    (used by the index builder)
//! 2. [`Keys`] - headwords of a loaded index in on-disk order
//!
//! # Example
//! ```no_run
//! # use mdict_index::Dictionary;
//! # let dict = Dictionary::open("dict.mdx").unwrap();
//! for key in dict.list_keys() {
//!     println!("{}", key);
//! }
//! ```

use std::slice;

use super::reader::MdictReader;
use super::types::error::Result;
use super::types::filetypes::FileType;
use super::types::models::{IndexEntry, KeyEntry};

/// Iterator over decoded key blocks.
///
/// Yields `(block_index, entries)` so callers can attribute failures to a block.
/// Created by [`MdictReader::iter_key_blocks()`].
pub struct KeyBlocks<'a, T: FileType> {
    reader: &'a MdictReader<T>,
    key_block_idx: usize,
}

impl<'a, T: FileType> KeyBlocks<'a, T> {
    pub(super) fn new(reader: &'a MdictReader<T>) -> Self {
        Self {
            reader,
            key_block_idx: 0,
        }
    }
}

impl<'a, T: FileType> Iterator for KeyBlocks<'a, T> {
    type Item = (usize, Result<Vec<KeyEntry>>);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.key_block_idx;
        if index >= self.reader.key_blocks().len() {
            return None;
        }
        self.key_block_idx += 1;
        Some((index, self.reader.read_key_block_entries(index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.reader.key_blocks().len() - self.key_block_idx;
        (left, Some(left))
    }
}

/// Iterator over the headwords of a container, in on-disk order.
///
/// Borrowed from the open dictionary; call `list_keys` again to restart.
#[derive(Clone)]
pub struct Keys<'a> {
    rows: slice::Iter<'a, IndexEntry>,
}

impl<'a> Keys<'a> {
    pub(crate) fn new(rows: &'a [IndexEntry]) -> Self {
        Self { rows: rows.iter() }
    }
}

impl<'a> Iterator for Keys<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| row.key_text.as_str())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Keys<'_> {}
