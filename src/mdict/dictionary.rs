//! The public dictionary handle.

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::config::{OpenOptions, ResourceSource};
use super::iter::Keys;
use super::lookup::{LookupEngine, MatchMode};
use super::persist::{self, CachePolicy, IndexOrigin, IndexStore, ProgressFn};
use super::reader::MdictReader;
use super::resolver::RecordResolver;
use super::types::error::{MdictError, Result};
use super::types::filetypes::{FileType, Mdd, Mdx};
use super::types::models::{IndexEntry, MdictHeader, TextEncoding};

/// An open dictionary (`.mdx`) and, optionally, its resource container (`.mdd`).
///
/// All lookups take `&self`; the handle can be shared between threads.
/// Dropping the handle (or calling [`close`](Self::close)) releases the files.
#[derive(Debug)]
pub struct Dictionary {
    entries: LookupEngine<Mdx>,
    resources: Option<LookupEngine<Mdd>>,
    cache_dir: Option<PathBuf>,
}

impl Dictionary {
    /// Opens `path` with default [`OpenOptions`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        OpenOptions::new().open(path)
    }

    pub(crate) fn open_with(path: &Path, mut options: OpenOptions) -> Result<Self> {
        info!("Opening dictionary {}", path.display());

        let mut silent = |_: u8, _: &str| {};
        let mut callback = options.on_progress.take();
        let progress: &mut ProgressFn<'_> = match callback.as_mut() {
            Some(cb) => cb.as_mut(),
            None => &mut silent,
        };

        let entries = open_engine::<Mdx>(path, &options, options.encoding, MatchMode::Headword, progress)?;

        let resource_path = match &options.resources {
            ResourceSource::Disabled => None,
            ResourceSource::Path(p) => {
                if !p.is_file() {
                    return Err(MdictError::FileNotFound(p.clone()));
                }
                Some(p.clone())
            }
            ResourceSource::Auto => {
                let candidate = path.with_extension("mdd");
                candidate.is_file().then_some(candidate)
            }
        };
        let resources = match resource_path {
            Some(p) => {
                debug!("Opening resource container {}", p.display());
                Some(open_engine::<Mdd>(&p, &options, None, MatchMode::Resource, progress)?)
            }
            None => None,
        };

        Ok(Self {
            entries,
            resources,
            cache_dir: options.cache_dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.entries.resolver().reader().path()
    }

    pub fn header(&self) -> &MdictHeader {
        self.entries.resolver().reader().header()
    }

    /// Header of the resource container, if one is open.
    pub fn resource_header(&self) -> Option<&MdictHeader> {
        self.resources.as_ref().map(|r| r.resolver().reader().header())
    }

    pub fn resource_path(&self) -> Option<&Path> {
        self.resources.as_ref().map(|r| r.resolver().reader().path())
    }

    pub fn index_origin(&self) -> IndexOrigin {
        self.entries.origin()
    }

    pub fn resource_index_origin(&self) -> Option<IndexOrigin> {
        self.resources.as_ref().map(|r| r.origin())
    }

    /// Number of headwords (duplicates included).
    pub fn entry_count(&self) -> u64 {
        self.entries.table().len() as u64
    }

    /// Looks up `word`: exact, then case-insensitive, then without interior
    /// hyphens. Redirects are followed. `Ok(None)` if nothing matches.
    pub fn lookup(&self, word: &str) -> Result<Option<String>> {
        self.entries.lookup(word)
    }

    /// Every entry for `word` matched by the first successful strategy.
    pub fn lookup_all(&self, word: &str) -> Result<Vec<String>> {
        self.entries.lookup_all(word)
    }

    /// Raw bytes of a resource such as `img/logo.png` or `\style.css`.
    ///
    /// `Ok(None)` if no resource container is open or the path is unknown.
    pub fn resolve_resource(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match &self.resources {
            Some(resources) => resources.lookup(path),
            None => Ok(None),
        }
    }

    /// Headwords in on-disk order.
    pub fn list_keys(&self) -> Keys<'_> {
        Keys::new(self.entries.table().rows())
    }

    /// Resource paths in on-disk order; empty if no resource container is open.
    pub fn list_resource_keys(&self) -> Keys<'_> {
        match &self.resources {
            Some(resources) => Keys::new(resources.table().rows()),
            None => Keys::new(&[]),
        }
    }

    /// Index rows of the dictionary, in on-disk order.
    pub fn index_entries(&self) -> &[IndexEntry] {
        self.entries.table().rows()
    }

    pub fn resource_index_entries(&self) -> &[IndexEntry] {
        self.resources
            .as_ref()
            .map(|r| r.table().rows())
            .unwrap_or(&[])
    }

    /// Side-car store of the dictionary index.
    pub fn index_store(&self) -> IndexStore {
        IndexStore::for_source(self.path(), self.cache_dir.as_deref())
    }

    /// Side-car store of the resource index, if a resource container is open.
    pub fn resource_index_store(&self) -> Option<IndexStore> {
        self.resource_path()
            .map(|p| IndexStore::for_source(p, self.cache_dir.as_deref()))
    }

    /// Releases the dictionary and its files.
    pub fn close(self) -> Result<()> {
        debug!("Closing dictionary {}", self.path().display());
        drop(self);
        Ok(())
    }
}

fn open_engine<T: FileType>(
    path: &Path,
    options: &OpenOptions,
    encoding: Option<TextEncoding>,
    mode: MatchMode,
    progress: &mut ProgressFn<'_>,
) -> Result<LookupEngine<T>> {
    let reader = MdictReader::<T>::open(path, options.passcode_pair(), encoding)?;
    let policy = CachePolicy {
        cache_dir: options.cache_dir.as_deref(),
        force_rebuild: options.force_rebuild,
        persist: options.persist_index,
    };
    let (table, origin) = persist::obtain(&reader, policy, progress)?;
    Ok(LookupEngine::new(
        RecordResolver::new(reader, options.block_cache_capacity),
        table,
        origin,
        mode,
        options.max_redirects,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn dictionary_is_send_and_sync() {
        assert_send_sync::<Dictionary>();
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.mdx");
        match Dictionary::open(&missing) {
            Err(MdictError::FileNotFound(p)) => assert_eq!(p, missing),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
