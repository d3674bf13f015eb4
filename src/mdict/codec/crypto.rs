//! Cryptographic operations for MDict file decryption.
//!
//! This module implements the encryption schemes used in MDict files:
//! - Master key derivation from registration codes and user e-mails
//! - Fast XOR-based encryption (key index and embedded block ciphers)
//! - Salsa20/8 stream cipher (key block info and embedded block ciphers)

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use ripemd::{Digest, Ripemd128};

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::EncryptionType;

/// Magic constant mixed into the key index cipher key.
const KEY_INDEX_SALT: u32 = 0x3695;

/// Derives the master decryption key from a hex registration code and user email.
///
/// # Algorithm
/// 1. Hash the user email with RIPEMD-128 → 16-byte digest
/// 2. Use digest as Salsa20/8 key to decrypt the registration code
/// 3. Decrypted registration code becomes the master key
pub fn derive_master_key(reg_code_hex: &str, user_id: &str) -> Result<[u8; 16]> {
    debug!("Deriving master key from registration code and user email");

    let reg_code = hex::decode(reg_code_hex.trim())
        .map_err(|e| MdictError::DecryptionError(format!("Registration code is not hex: {}", e)))?;
    if reg_code.len() != 16 {
        return Err(MdictError::DecryptionError(format!(
            "Registration code must be 16 bytes, got {}",
            reg_code.len()
        )));
    }

    let salsa_key = ripemd128(&[user_id.as_bytes()]);

    let mut master_key = [0u8; 16];
    master_key.copy_from_slice(&reg_code);
    salsa_decrypt(&mut master_key, &salsa_key);
    Ok(master_key)
}

/// Decrypts data using the fast XOR-based cipher.
///
/// # Algorithm
/// For each byte at position `i`:
/// 1. Rotate byte left by 4 bits
/// 2. XOR with: `previous_byte ^ i ^ key[i % key.len()]`
/// 3. Store original byte for next iteration
///
/// Initial `previous_byte` is `0x36`.
pub fn fast_decrypt(data: &mut [u8], key: &[u8]) {
    trace!("Decrypting {} bytes with fast XOR method", data.len());

    let mut prev = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let current = *byte;
        let rotated = current.rotate_left(4);
        *byte = rotated ^ prev ^ (i as u8) ^ key[i % key.len()];
        prev = current;
    }
}

/// Key for the key index block: `RIPEMD-128(checksum_bytes || 0x3695 LE)`.
pub fn derive_key_index_key(checksum: &[u8]) -> [u8; 16] {
    trace!("Deriving key index key from block checksum");
    ripemd128(&[checksum, &KEY_INDEX_SALT.to_le_bytes()])
}

/// Fallback key for blocks carrying their own encryption tag when no master key is set.
pub fn derive_block_key(checksum: &[u8]) -> [u8; 16] {
    ripemd128(&[checksum])
}

fn ripemd128(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Ripemd128::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Decrypts a payload in-place using the specified encryption method.
pub fn decrypt_payload_in_place(payload: &mut [u8], encryption_type: EncryptionType, key: &[u8; 16]) {
    match encryption_type {
        EncryptionType::None => {}
        EncryptionType::Fast => fast_decrypt(payload, key),
        EncryptionType::Salsa20 => salsa_decrypt(payload, key),
    }
}

/// Decrypts data in-place using the Salsa20/8 stream cipher.
///
/// Salsa20 with 8 rounds and a 128-bit key. The nonce is always zero.
///
/// # State Matrix
/// The 64-byte state is arranged as a 4×4 matrix of 32-bit little-endian words:
/// ```text
/// [c0, k0, k1, k2]
/// [k3, c1, iv0, iv1]
/// [ctr0, ctr1, c2, k4]
/// [k5, k6, k7, c3]
/// ```
/// For a 16-byte key, `k0..k3` and `k4..k7` are identical. Being a stream
/// cipher, the same call also encrypts.
pub fn salsa_decrypt(data: &mut [u8], key16: &[u8; 16]) {
    trace!("Decrypting {} bytes with Salsa20/8", data.len());

    let mut state = [0u32; 16];

    // "expand 16-byte k"
    state[0] = 0x61707865;
    state[5] = 0x3120646e;
    state[10] = 0x79622d36;
    state[15] = 0x6b206574;
    for i in 0..4 {
        state[1 + i] = LittleEndian::read_u32(&key16[i * 4..]);
        state[11 + i] = LittleEndian::read_u32(&key16[i * 4..]);
    }
    let mut keystream_block = [0u8; 64];

    for (block_index, chunk) in data.chunks_mut(64).enumerate() {
        state[8] = block_index as u32;
        state[9] = (block_index as u64 >> 32) as u32;

        let mut x = state;
        for _ in 0..4 {
            quarter_round(&mut x, 0, 4, 8, 12);
            quarter_round(&mut x, 5, 9, 13, 1);
            quarter_round(&mut x, 10, 14, 2, 6);
            quarter_round(&mut x, 15, 3, 7, 11);

            quarter_round(&mut x, 0, 1, 2, 3);
            quarter_round(&mut x, 5, 6, 7, 4);
            quarter_round(&mut x, 10, 11, 8, 9);
            quarter_round(&mut x, 15, 12, 13, 14);
        }

        for (i, val) in x.iter_mut().enumerate() {
            *val = val.wrapping_add(state[i]);
        }
        for (i, word) in x.iter().enumerate() {
            LittleEndian::write_u32(&mut keystream_block[i * 4..], *word);
        }
        for (byte, key) in chunk.iter_mut().zip(keystream_block.iter()) {
            *byte ^= key;
        }
    }
}

#[inline(always)]
fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}
