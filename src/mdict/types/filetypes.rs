//! Specialization logic for MDict file types (.mdx vs .mdd).

use encoding_rs::UTF_16LE;

use super::models::TextEncoding;

/// Payload prefix marking a record as an alias of another key.
pub const REDIRECT_PREFIX: &str = "@@@LINK=";

/// A record after file-type specific processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData<R> {
    /// The record's own content.
    Content(R),
    /// The record redirects to another key (`@@@LINK=target`).
    Redirect(String),
}

/// A trait that defines the behavior of a specific MDict file type (MDX or MDD).
pub trait FileType: Send + Sync + 'static {
    /// A short name used for debugging and logging.
    const DEBUG_NAME: &'static str;

    /// The type of record data contained in this file.
    /// - `String` for MDX files.
    /// - `Vec<u8>` for MDD files.
    type Record: Send;

    /// The mandatory key encoding for this file type, if any.
    ///
    /// - `None`: Use the encoding specified in the file header. (MDX behavior)
    /// - `Some(encoding)`: Always use this encoding instead of the header. (MDD behavior)
    const ENCODING_OVERRIDE: Option<TextEncoding>;

    /// Processes raw record bytes into the final record type, detecting redirects.
    fn process_record(bytes: &[u8], encoding: TextEncoding) -> RecordData<Self::Record>;
}

/// Zero-cost marker struct for MDX files.
#[derive(Debug)]
pub struct Mdx;

impl FileType for Mdx {
    const DEBUG_NAME: &'static str = "MDX";
    type Record = String;
    const ENCODING_OVERRIDE: Option<TextEncoding> = None;

    fn process_record(bytes: &[u8], encoding: TextEncoding) -> RecordData<Self::Record> {
        let text = encoding.decode(bytes);
        let stripped = text.trim_end_matches('\0');

        match stripped.strip_prefix(REDIRECT_PREFIX) {
            Some(target) => RecordData::Redirect(clean_target(target)),
            None => RecordData::Content(stripped.to_owned()),
        }
    }
}

/// Zero-cost marker struct for MDD files.
#[derive(Debug)]
pub struct Mdd;

impl FileType for Mdd {
    const DEBUG_NAME: &'static str = "MDD";
    type Record = Vec<u8>;
    const ENCODING_OVERRIDE: Option<TextEncoding> = Some(TextEncoding::Utf16);

    fn process_record(bytes: &[u8], _encoding: TextEncoding) -> RecordData<Self::Record> {
        // Resource aliases are stored as UTF-16LE text like MDD keys.
        let prefix_len = REDIRECT_PREFIX.len() * 2;
        if bytes.len() > prefix_len && is_utf16_redirect(&bytes[..prefix_len]) {
            let (text, _) = UTF_16LE.decode_without_bom_handling(&bytes[prefix_len..]);
            return RecordData::Redirect(clean_target(&text));
        }
        RecordData::Content(bytes.to_vec())
    }
}

fn is_utf16_redirect(head: &[u8]) -> bool {
    head.chunks_exact(2)
        .zip(REDIRECT_PREFIX.bytes())
        .all(|(unit, expected)| unit[0] == expected && unit[1] == 0)
}

fn clean_target(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_owned()
}
