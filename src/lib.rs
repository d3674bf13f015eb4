//! # mdict-index
//!
//! Offline lookup in MDict dictionaries (`.mdx`) and their resource
//! containers (`.mdd`), format versions 1.x and 2.x.
//!
//! Opening a dictionary parses its header and block tables, then loads a
//! side-car index (`dict.mdx.idx`) or builds one with a full key scan. Lookups
//! go through the in-memory index and decompress only the record block that
//! holds the answer.
//!
//! ```no_run
//! use mdict_index::Dictionary;
//!
//! let dict = Dictionary::open("oald.mdx")?;
//! if let Some(html) = dict.lookup("co-operate")? {
//!     println!("{html}");
//! }
//! let logo = dict.resolve_resource("img/logo.png")?;
//! dict.close()?;
//! # Ok::<(), mdict_index::MdictError>(())
//! ```
pub mod mdict;

pub use mdict::{
    models::{
        BlockMeta, EncryptionFlags, IndexEntry, KeyBlockDescriptor, KeyEntry, MdictHeader,
        MdictVersion, TextEncoding,
    },
    persist::{IndexOrigin, IndexStore, SchemaReport},
    Dictionary, FileType, Keys, MdictError, MdictReader, Mdd, Mdx, OpenOptions, Passcode,
    RecordData, ResourceSource, Result,
};
