//! Custom error types for the mdict-index crate.

use std::path::PathBuf;

use thiserror::Error;

use super::models::BlockRef;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum MdictError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container file (or its configured companion) does not exist.
    #[error("Dictionary file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The header block is unreadable: bad checksum, broken XML, or a required attribute is missing.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The MDict file version is unsupported (3.0+).
    #[error("Unsupported MDict version: {0}. Only v1.x and v2.x are supported.")]
    UnsupportedVersion(f32),

    /// A compressed block failed to decode or verify.
    #[error("Corrupt {block}: {reason}")]
    CorruptBlock { block: BlockRef, reason: String },

    /// The full key scan failed; the partial index was discarded.
    #[error("Index build failed for {} at key block {block_index}: {source}", path.display())]
    IndexBuild {
        path: PathBuf,
        block_index: usize,
        #[source]
        source: Box<MdictError>,
    },

    /// An index entry points outside every record block (index and file disagree).
    #[error("Record offset {offset} is outside the record stream ({total} bytes)")]
    OffsetOutOfRange { offset: u64, total: u64 },

    /// Redirect targets revisit a key or exceed the hop limit.
    #[error("Redirect loop: {}", chain.join(" -> "))]
    RedirectLoop { chain: Vec<String> },

    /// Fewer bytes remain than a length field declares.
    #[error("Truncated data in {context}: needed {needed} bytes, {available} available")]
    TruncatedData {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    /// A declared count of items does not match the actual number of items found.
    #[error("Count mismatch for {item_type}: expected {expected}, but found {found}")]
    CountMismatch {
        item_type: String,
        expected: u64,
        found: u64,
    },

    /// The file is encrypted, but no passcode was provided to derive the decryption key.
    #[error("Encrypted file requires a passcode, but none was provided.")]
    PasscodeRequired,

    /// An error occurred while preparing decryption, usually a malformed registration code.
    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    /// The file is structurally invalid or does not conform to the MDict format.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The side-car index file is unusable. Never escapes `open`; it triggers a rebuild.
    #[error("Index cache unusable: {0}")]
    CacheFormat(String),

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A mutex lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

impl MdictError {
    pub(crate) fn corrupt(block: BlockRef, reason: impl Into<String>) -> Self {
        MdictError::CorruptBlock {
            block,
            reason: reason.into(),
        }
    }

    /// Attaches block context to a low-level decoding error.
    ///
    /// Truncation and format errors raised while decoding a block's payload
    /// are reported as corruption of that block.
    pub(crate) fn within(self, block: BlockRef) -> Self {
        match self {
            MdictError::InvalidFormat(reason) => MdictError::corrupt(block, reason),
            MdictError::TruncatedData { .. } | MdictError::CountMismatch { .. } => {
                MdictError::corrupt(block, self.to_string())
            }
            other => other,
        }
    }
}

/// A convenience `Result` type alias using the crate's `MdictError` type.
pub type Result<T> = std::result::Result<T, MdictError>;
