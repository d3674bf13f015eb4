//! MDict container decoding, persistent indexing and lookup.
//!
//! Layers, bottom-up:
//! - [`utils`], [`codec`], [`format`]: byte readers, ciphers and decompression, container layout
//! - [`reader`], [`iter`]: on-demand block access for one container
//! - [`persist`]: index build, side-car cache and in-memory lookup maps
//! - [`block_cache`], [`resolver`]: record payloads through a bounded block cache
//! - [`lookup`], [`dictionary`], [`config`]: fallback matching, redirects and the public handle

pub mod block_cache;
pub mod codec;
pub mod config;
pub mod dictionary;
pub mod format;
pub mod iter;
pub mod lookup;
pub mod persist;
pub mod reader;
pub mod resolver;
pub mod types;
pub mod utils;

pub use config::{OpenOptions, Passcode, ResourceSource};
pub use dictionary::Dictionary;
pub use iter::Keys;
pub use reader::MdictReader;
pub use types::error::{MdictError, Result};
pub use types::filetypes::{FileType, Mdd, Mdx, RecordData};
pub use types::models;
