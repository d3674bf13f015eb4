//! Low-level byte reading utilities.
//!
//! All readers advance a `&mut &[u8]` cursor and fail with
//! [`MdictError::TruncatedData`] when fewer bytes remain than a field needs.

use byteorder::{BigEndian, ByteOrder};

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{MdictVersion, TextEncoding};

/// Splits `len` bytes off the front of the cursor.
pub fn take<'a>(cursor: &mut &'a [u8], len: usize, context: &'static str) -> Result<&'a [u8]> {
    if cursor.len() < len {
        return Err(MdictError::TruncatedData {
            context,
            needed: len,
            available: cursor.len(),
        });
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

/// Read a 4 or 8 byte big-endian number.
///
/// Used throughout MDict format for size and count fields.
/// Width depends on format version (v1.x uses 4 bytes, v2.x uses 8 bytes).
pub fn read_number(cursor: &mut &[u8], number_width: usize, context: &'static str) -> Result<u64> {
    match number_width {
        8 => Ok(BigEndian::read_u64(take(cursor, 8, context)?)),
        4 => Ok(BigEndian::read_u32(take(cursor, 4, context)?) as u64),
        _ => Err(MdictError::InvalidFormat(format!("Invalid number width: {}", number_width))),
    }
}

/// Read a 1 or 2 byte big-endian number.
///
/// Used for text length prefixes in MDict format.
pub fn read_small_number(cursor: &mut &[u8], number_width: usize, context: &'static str) -> Result<u64> {
    match number_width {
        2 => Ok(BigEndian::read_u16(take(cursor, 2, context)?) as u64),
        1 => Ok(take(cursor, 1, context)?[0] as u64),
        _ => Err(MdictError::InvalidFormat(format!(
            "Invalid small number width: {}",
            number_width
        ))),
    }
}

/// Reads a length-prefixed string as found in key block descriptors.
///
/// The prefix counts code units, not bytes. V2 files follow the text with one
/// terminator unit that is skipped.
pub fn read_prefixed_text(
    cursor: &mut &[u8],
    version: MdictVersion,
    encoding: TextEncoding,
    context: &'static str,
) -> Result<String> {
    let units = read_small_number(cursor, version.small_number_width(), context)? as usize;
    let width = encoding.unit_width();
    let text_len = units * width;
    let total = text_len + version.text_terminator_units() * width;
    let raw = take(cursor, total, context)?;
    Ok(encoding.decode(&raw[..text_len]))
}

/// Reads a NUL-terminated string and advances past its terminator.
///
/// The terminator is one code unit wide: two zero bytes for UTF-16, one otherwise.
pub fn read_null_terminated_text(
    cursor: &mut &[u8],
    encoding: TextEncoding,
    context: &'static str,
) -> Result<String> {
    let width = encoding.unit_width();
    let end_pos = if width == 2 {
        cursor
            .chunks_exact(2)
            .position(|chunk| chunk == [0, 0])
            .map(|chunk_index| chunk_index * 2)
    } else {
        cursor.iter().position(|&byte| byte == 0)
    }
    .ok_or(MdictError::TruncatedData {
        context,
        needed: cursor.len() + width,
        available: cursor.len(),
    })?;

    let text = encoding.decode(&cursor[..end_pos]);
    *cursor = &cursor[end_pos + width..];
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_follow_version_width() {
        let data = [0, 0, 0, 0, 0, 0, 1, 2, 0, 0, 0, 7];
        let mut cursor = &data[..];
        assert_eq!(read_number(&mut cursor, 8, "test").unwrap(), 0x0102);
        assert_eq!(read_number(&mut cursor, 4, "test").unwrap(), 7);
        assert!(cursor.is_empty());
    }

    #[test]
    fn short_input_is_truncated_data() {
        let data = [0, 1, 2];
        let mut cursor = &data[..];
        match read_number(&mut cursor, 4, "count") {
            Err(MdictError::TruncatedData {
                context,
                needed,
                available,
            }) => {
                assert_eq!(context, "count");
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn prefixed_text_v2_skips_terminator() {
        let data = [0, 3, b'a', b'b', b'c', 0, b'x'];
        let mut cursor = &data[..];
        let text = read_prefixed_text(&mut cursor, MdictVersion::V2, TextEncoding::Utf8, "key").unwrap();
        assert_eq!(text, "abc");
        assert_eq!(cursor, b"x");
    }

    #[test]
    fn prefixed_text_utf16_counts_units() {
        let mut data = vec![0, 2];
        data.extend_from_slice(&[b'h', 0, b'i', 0, 0, 0]);
        let mut cursor = &data[..];
        let text = read_prefixed_text(&mut cursor, MdictVersion::V2, TextEncoding::Utf16, "key").unwrap();
        assert_eq!(text, "hi");
        assert!(cursor.is_empty());
    }

    #[test]
    fn prefixed_text_v1_has_no_terminator() {
        let data = [2, b'o', b'k', 9];
        let mut cursor = &data[..];
        let text = read_prefixed_text(&mut cursor, MdictVersion::V1, TextEncoding::Utf8, "key").unwrap();
        assert_eq!(text, "ok");
        assert_eq!(cursor, &[9]);
    }

    #[test]
    fn null_terminated_utf16_is_unit_aligned() {
        // 0x0100 contains a zero byte but is not a terminator.
        let data = [0x00, 0x01, b'a', 0, 0, 0, 0xFF];
        let mut cursor = &data[..];
        let text = read_null_terminated_text(&mut cursor, TextEncoding::Utf16, "key").unwrap();
        assert_eq!(text, "\u{0100}a");
        assert_eq!(cursor, &[0xFF]);
    }

    #[test]
    fn missing_terminator_is_truncated() {
        let data = [b'a', b'b'];
        let mut cursor = &data[..];
        assert!(matches!(
            read_null_terminated_text(&mut cursor, TextEncoding::Utf8, "key"),
            Err(MdictError::TruncatedData { .. })
        ));
    }
}
