//! MDict file header parsing and encryption key derivation.
//!
//! This module handles:
//! - Parsing the XML header from MDict files
//! - Validating header checksums
//! - Extracting metadata (title, encoding, encryption flags, etc.)
//! - Deriving the master decryption key from a passcode

use std::collections::HashMap;
use std::io::{self, Read};

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::UTF_16LE;
use log::{debug, info, trace};
use quick_xml::{events::Event, Reader};

use crate::mdict::codec::crypto;
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{EncryptionFlags, MdictHeader, MdictVersion, TextEncoding};

/// Parses the MDict file header from the beginning of the file.
///
/// # Header Structure
/// ```text
/// [4 bytes] Header length (big-endian u32)
/// [N bytes] XML metadata (UTF-16LE)
/// [4 bytes] Adler32 checksum (little-endian u32)
/// ```
///
/// # Parameters
/// * `file` - Reader positioned at the start of an MDict file
/// * `file_len` - Total file size, used to reject absurd length fields
/// * `passcode` - Optional `(regcode_hex, user_email)` for encrypted files
/// * `encoding_override` - Forces the key/record encoding, and makes the `Encoding` attribute optional
///
/// # Returns
/// The header (block counts still zero) and the byte offset where it ends.
pub fn parse<R: Read>(
    file: &mut R,
    file_len: u64,
    passcode: Option<(&str, &str)>,
    encoding_override: Option<TextEncoding>,
) -> Result<(MdictHeader, u64)> {
    debug!("Parsing MDict header");

    let mut len_bytes = [0u8; 4];
    read_header_bytes(file, &mut len_bytes)?;
    let header_len = BigEndian::read_u32(&len_bytes) as u64;
    trace!("Header length: {} bytes", header_len);
    if header_len + 8 > file_len {
        return Err(MdictError::MalformedHeader(format!(
            "Header length {} exceeds file size {}",
            header_len, file_len
        )));
    }

    let mut header_bytes = vec![0u8; header_len as usize];
    read_header_bytes(file, &mut header_bytes)?;

    let mut checksum_bytes = [0u8; 4];
    read_header_bytes(file, &mut checksum_bytes)?;
    let checksum_expected = LittleEndian::read_u32(&checksum_bytes);
    let checksum_actual = adler32_slice(&header_bytes);
    trace!(
        "Header checksum: expected={:#010x}, actual={:#010x}",
        checksum_expected,
        checksum_actual
    );
    if checksum_actual != checksum_expected {
        return Err(MdictError::MalformedHeader(format!(
            "Checksum mismatch: expected {:#010x}, computed {:#010x}",
            checksum_expected, checksum_actual
        )));
    }

    let (decoded, _) = UTF_16LE.decode_without_bom_handling(&header_bytes);
    let sanitized: String = decoded
        .trim_end_matches('\0')
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    let attrs = parse_xml_attributes(&sanitized)?;
    let mut header = build_header_from_attributes(&attrs, encoding_override)?;

    if let Some((reg_code_hex, user_email)) = passcode {
        info!("Deriving master decryption key from provided passcode");
        header.master_key = Some(crypto::derive_master_key(reg_code_hex, user_email)?);
    }

    debug!(
        "Header parsed: version={}, title='{}', encoding={}, encrypted=(blocks={}, index={})",
        header.engine_version,
        header.title,
        header.encoding,
        header.encryption_flags.encrypt_record_blocks,
        header.encryption_flags.encrypt_key_index
    );

    Ok((header, header_len + 8))
}

fn read_header_bytes<R: Read>(file: &mut R, buf: &mut [u8]) -> Result<()> {
    file.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            MdictError::MalformedHeader("File ends inside the header block".to_string())
        }
        _ => MdictError::Io(e),
    })
}

/// Extracts all attributes from the root XML element.
///
/// The MDict header is a single XML element with all metadata as attributes.
fn parse_xml_attributes(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return e
                    .attributes()
                    .map(|attr_result| {
                        let attr = attr_result.map_err(|e| {
                            MdictError::MalformedHeader(format!("Failed to parse XML attribute: {}", e))
                        })?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| {
                                MdictError::MalformedHeader(format!("Failed to decode XML value: {}", e))
                            })?
                            .into_owned();
                        Ok((key, value))
                    })
                    .collect();
            }
            Ok(Event::Eof) => {
                return Err(MdictError::MalformedHeader(
                    "No root element found in header XML".to_string(),
                ))
            }
            Err(e) => {
                return Err(MdictError::MalformedHeader(format!(
                    "Failed to read header XML: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Constructs the header from parsed XML attributes.
fn build_header_from_attributes(
    attrs: &HashMap<String, String>,
    encoding_override: Option<TextEncoding>,
) -> Result<MdictHeader> {
    let version_str = attrs
        .get("GeneratedByEngineVersion")
        .map(|s| s.trim())
        .ok_or_else(|| {
            MdictError::MalformedHeader("Missing 'GeneratedByEngineVersion' attribute".to_string())
        })?;
    let version_f32: f32 = version_str.parse().map_err(|e| {
        MdictError::MalformedHeader(format!(
            "Could not parse 'GeneratedByEngineVersion' value '{}': {}",
            version_str, e
        ))
    })?;
    let version = MdictVersion::try_from(version_f32)?;
    debug!("MDict version: {} (parsed as {:?})", version_str, version);

    let encoding = match (encoding_override, attrs.get("Encoding")) {
        (Some(forced), _) => forced,
        (None, Some(label)) => TextEncoding::from_label(label),
        (None, None) => {
            return Err(MdictError::MalformedHeader(
                "Missing 'Encoding' attribute".to_string(),
            ))
        }
    };
    debug!("Text encoding: {}", encoding);

    let encryption_flags = match attrs.get("Encrypted").map(|s| s.trim()) {
        None | Some("") | Some("No") => EncryptionFlags::default(),
        Some("Yes") => EncryptionFlags::from_bits(0x01),
        Some(other) => {
            let bits: u8 = other.parse().map_err(|_| {
                MdictError::MalformedHeader(format!("Unrecognised 'Encrypted' value '{}'", other))
            })?;
            debug!("Encryption flags: {:#04x}", bits);
            EncryptionFlags::from_bits(bits)
        }
    };

    let title = attrs
        .get("Title")
        .cloned()
        .unwrap_or_else(|| "Untitled Dictionary".to_string());

    Ok(MdictHeader {
        version,
        engine_version: version_str.to_string(),
        encryption_flags,
        encoding,
        title,
        description: attrs.get("Description").cloned(),
        stylesheet: attrs.get("StyleSheet").cloned(),
        key_block_count: 0,
        entry_count: 0,
        master_key: None,
    })
}
