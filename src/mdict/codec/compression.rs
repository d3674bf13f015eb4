//! Decompression algorithms for MDict data blocks.
//!
//! MDict files support multiple compression formats:
//! - None (type 0): No compression
//! - LZO (type 1): LZO1X via lzokay
//! - Zlib (type 2): Standard deflate compression

use std::io::Read;

use flate2::read::ZlibDecoder;
use log::trace;
use lzokay::decompress::decompress as lzokay_decompress;

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::CompressionType;

/// Upper bound on output bytes per input byte. Deflate tops out near 1032:1
/// and LZO1X well below that.
const MAX_EXPANSION: usize = 1032;

/// Headroom for stream headers and tiny payloads.
const EXPANSION_SLACK: usize = 64;

/// Decompresses a payload into a freshly sized output buffer.
///
/// # Validation
/// The output must be exactly `expected_size` bytes; anything else is an
/// [`MdictError::InvalidFormat`] which block decoding reports as corruption.
/// A declared size the payload could never expand to is rejected before any
/// buffer is allocated.
pub fn decompress_payload(
    payload: &[u8],
    compression_type: CompressionType,
    expected_size: u64,
) -> Result<Vec<u8>> {
    let expected = usize::try_from(expected_size).map_err(|_| {
        MdictError::InvalidFormat(format!("Declared block size {} is too large", expected_size))
    })?;
    let limit = match compression_type {
        CompressionType::None => payload.len(),
        _ => payload
            .len()
            .saturating_mul(MAX_EXPANSION)
            .saturating_add(EXPANSION_SLACK),
    };
    if expected > limit {
        return Err(MdictError::InvalidFormat(format!(
            "Declared block size {} cannot come from a {} byte payload",
            expected,
            payload.len()
        )));
    }
    let mut output = Vec::new();
    output.try_reserve_exact(expected).map_err(|e| {
        MdictError::InvalidFormat(format!("Cannot allocate {} bytes for a block: {}", expected, e))
    })?;
    output.resize(expected, 0);

    match compression_type {
        CompressionType::None => {
            trace!("No compression, copying {} bytes", payload.len());
            if payload.len() != expected {
                return Err(size_mismatch("stored", expected, payload.len()));
            }
            output.copy_from_slice(payload);
        }
        CompressionType::Lzo => {
            trace!("Decompressing with LZO: {} -> {} bytes", payload.len(), expected);
            let written = lzokay_decompress(payload, &mut output)
                .map_err(|e| MdictError::InvalidFormat(format!("LZO decompression failed: {:?}", e)))?;
            if written != expected {
                return Err(size_mismatch("LZO", expected, written));
            }
        }
        CompressionType::Zlib => {
            trace!("Decompressing with Zlib: {} -> {} bytes", payload.len(), expected);
            let mut decoder = ZlibDecoder::new(payload);
            decoder
                .read_exact(&mut output)
                .map_err(|e| MdictError::InvalidFormat(format!("Zlib decompression failed: {}", e)))?;
            let mut extra = [0u8; 1];
            let trailing = decoder
                .read(&mut extra)
                .map_err(|e| MdictError::InvalidFormat(format!("Zlib decompression failed: {}", e)))?;
            if trailing != 0 {
                return Err(MdictError::InvalidFormat(format!(
                    "Zlib stream is longer than the declared {} bytes",
                    expected
                )));
            }
        }
    }

    Ok(output)
}

fn size_mismatch(method: &str, expected: usize, found: usize) -> MdictError {
    MdictError::InvalidFormat(format!(
        "{} payload decompressed to {} bytes, expected {}",
        method, found, expected
    ))
}
