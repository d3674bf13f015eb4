//! Persistent index: build, side-car storage and cache validation.
//!
//! - [`builder`]: full key scan producing every index row
//! - [`schema`]: side-car format constants and metadata
//! - [`store`]: side-car reading, atomic writing and inspection
//! - [`table`]: in-memory index with the fallback lookup maps

use std::path::Path;

use log::{info, warn};

use crate::mdict::reader::MdictReader;
use crate::mdict::types::error::Result;
use crate::mdict::types::filetypes::FileType;

pub mod builder;
pub mod schema;
pub mod store;
pub mod table;

pub use builder::ProgressFn;
pub use schema::{IndexMeta, IndexOrigin, PersistedIndex, SourceFingerprint};
pub use store::{IndexStore, SchemaReport};
pub use table::IndexTable;

/// Cache policy for one container.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy<'a> {
    pub cache_dir: Option<&'a Path>,
    /// Skip loading the side-car (it is still rewritten if `persist`).
    pub force_rebuild: bool,
    /// Write the side-car after a rebuild.
    pub persist: bool,
}

/// Loads the side-car index of `reader` if it is valid, else rebuilds it.
///
/// A rejected side-car is logged and replaced. A side-car that cannot be
/// written is logged and the freshly built index is used for this session.
pub fn obtain<T: FileType>(
    reader: &MdictReader<T>,
    policy: CachePolicy<'_>,
    progress: &mut ProgressFn<'_>,
) -> Result<(IndexTable, IndexOrigin)> {
    let fingerprint = SourceFingerprint::of(reader.path())?;
    let expected = IndexMeta::describe(reader.header(), fingerprint.clone());
    let store = IndexStore::for_source(reader.path(), policy.cache_dir);

    if policy.persist && !policy.force_rebuild {
        match store.load(&expected) {
            Ok(Some(index)) => {
                info!(
                    "Using cached {} index {}",
                    T::DEBUG_NAME,
                    store.path().display()
                );
                return Ok((IndexTable::new(index), IndexOrigin::Cache));
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Rejecting side-car index {}: {}; rebuilding",
                store.path().display(),
                e
            ),
        }
    }

    let index = builder::build(reader, fingerprint, progress)?;
    if policy.persist {
        if let Err(e) = store.save(&index) {
            warn!(
                "Could not write side-car index {}: {}; using in-memory index",
                store.path().display(),
                e
            );
        }
    }
    Ok((IndexTable::new(index), IndexOrigin::Built))
}
