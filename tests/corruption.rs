mod common;

use std::fs;

use common::{sample_mdx, Compression};
use mdict_index::mdict::models::{BlockRef, BlockType};
use mdict_index::{Dictionary, MdictError, OpenOptions};

#[test]
fn damaged_record_block_names_the_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.mdx");
    let layout = sample_mdx()
        .compression(Compression::Stored)
        .records_per_block(4)
        .write(&path);

    let mut bytes = fs::read(&path).unwrap();
    let second = layout.record_blocks[1];
    bytes[(second.start + 10) as usize] ^= 0x20;
    fs::write(&path, &bytes).unwrap();

    // The index only needs the key blocks, so opening still succeeds.
    let dict = OpenOptions::new().persist_index(false).open(&path).unwrap();
    assert_eq!(
        dict.lookup("apple").unwrap().as_deref(),
        Some("<b>apple</b> a fruit")
    );
    match dict.lookup("co-operate") {
        Err(MdictError::CorruptBlock { block, reason }) => {
            assert_eq!(block, BlockRef::new(BlockType::Record, 1));
            assert!(reason.contains("Checksum"), "{reason}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn inflated_record_size_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.mdx");
    let layout = sample_mdx().records_per_block(100).write(&path);
    assert_eq!(layout.record_blocks.len(), 1);

    // The record index ends with the block's decompressed size (u64 BE);
    // setting its top byte claims a block of 2^56 bytes.
    let mut bytes = fs::read(&path).unwrap();
    let size_field = layout.record_blocks[0].start as usize - 8;
    bytes[size_field] = 0x01;
    fs::write(&path, &bytes).unwrap();

    let dict = match OpenOptions::new().persist_index(false).open(&path) {
        Ok(dict) => dict,
        Err(e) => panic!("key blocks are intact, open should work: {e}"),
    };
    match dict.lookup("apple") {
        Err(MdictError::CorruptBlock { block, reason }) => {
            assert_eq!(block, BlockRef::new(BlockType::Record, 0));
            assert!(reason.contains("cannot come from"), "{reason}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn overflowing_record_sizes_fail_the_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.mdx");
    let layout = sample_mdx().records_per_block(4).write(&path);
    assert_eq!(layout.record_blocks.len(), 3);

    // Three (compressed, decompressed) u64 pairs precede the first block.
    let mut bytes = fs::read(&path).unwrap();
    let first_decompressed = layout.record_blocks[0].start as usize - 48 + 8;
    bytes[first_decompressed..first_decompressed + 8].fill(0xFF);
    fs::write(&path, &bytes).unwrap();

    match OpenOptions::new().persist_index(false).open(&path) {
        Err(e) => assert!(e.to_string().contains("overflows"), "{e}"),
        Ok(_) => panic!("overflowing record index was accepted"),
    }
}

#[test]
fn damaged_key_block_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.mdx");
    let layout = sample_mdx()
        .compression(Compression::Stored)
        .keys_per_block(3)
        .write(&path);

    let mut bytes = fs::read(&path).unwrap();
    let block = layout.key_blocks[1];
    bytes[(block.start + block.len - 3) as usize] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    match Dictionary::open(&path) {
        Err(MdictError::IndexBuild {
            block_index,
            source,
            ..
        }) => {
            assert_eq!(block_index, 1);
            assert!(matches!(
                *source,
                MdictError::CorruptBlock {
                    block: BlockRef {
                        kind: BlockType::Key,
                        index: 1
                    },
                    ..
                }
            ));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!dir.path().join("dict.mdx.idx").exists());
}

#[test]
fn damaged_header_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_mdx().write_in(dir.path(), "dict.mdx");
    let mut bytes = fs::read(&path).unwrap();
    bytes[10] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        Dictionary::open(&path),
        Err(MdictError::MalformedHeader(_))
    ));
}

#[test]
fn truncated_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.mdx");
    let layout = sample_mdx().write(&path);
    let bytes = fs::read(&path).unwrap();
    let cut = layout.record_blocks[0].start as usize + 4;
    fs::write(&path, &bytes[..cut]).unwrap();

    match Dictionary::open(&path) {
        Err(MdictError::TruncatedData { context, .. }) => assert_eq!(context, "record blocks"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn unsupported_version_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = sample_mdx().write_in(dir.path(), "dict.mdx");
    let bytes = fs::read(&path).unwrap();

    // Patch the engine version "2.0" to "3.0" and fix the header checksum.
    let header_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut header = bytes[4..4 + header_len].to_vec();
    let needle: Vec<u8> = "\"2.0\"".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    let at = header
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .unwrap();
    header[at + 2] = b'3';
    let mut patched = bytes[..4].to_vec();
    patched.extend_from_slice(&header);
    patched.extend_from_slice(&adler2::adler32_slice(&header).to_le_bytes());
    patched.extend_from_slice(&bytes[8 + header_len..]);
    fs::write(&path, &patched).unwrap();

    assert!(matches!(
        Dictionary::open(&path),
        Err(MdictError::UnsupportedVersion(v)) if v >= 3.0
    ));
}

#[test]
fn missing_dictionary_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nothing.mdx");
    assert!(matches!(
        Dictionary::open(&missing),
        Err(MdictError::FileNotFound(p)) if p == missing
    ));
}
