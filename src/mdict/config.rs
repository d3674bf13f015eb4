//! Options for opening a dictionary.

use std::fmt;
use std::path::{Path, PathBuf};

use super::block_cache::DEFAULT_BLOCK_CACHE_CAPACITY;
use super::dictionary::Dictionary;
use super::lookup::DEFAULT_MAX_REDIRECTS;
use super::types::error::Result;
use super::types::models::TextEncoding;

/// Registration code and user e-mail for encrypted dictionaries.
#[derive(Clone, PartialEq, Eq)]
pub struct Passcode {
    /// 32 hex digits.
    pub reg_code: String,
    pub email: String,
}

impl fmt::Debug for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passcode")
            .field("reg_code", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Where the companion resource container (`.mdd`) comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResourceSource {
    /// Same directory and stem as the dictionary, if such a file exists.
    #[default]
    Auto,
    /// This file; it must exist.
    Path(PathBuf),
    /// Do not open resources.
    Disabled,
}

pub(crate) type ProgressCallback = Box<dyn FnMut(u8, &str) + Send>;

/// Builder for [`Dictionary`].
///
/// ```no_run
/// use mdict_index::OpenOptions;
///
/// let dict = OpenOptions::new()
///     .cache_dir("/tmp/mdict-cache")
///     .max_redirects(5)
///     .on_progress(|percent, message| eprintln!("{percent:3}% {message}"))
///     .open("dict.mdx")?;
/// # Ok::<(), mdict_index::MdictError>(())
/// ```
pub struct OpenOptions {
    pub(crate) passcode: Option<Passcode>,
    pub(crate) encoding: Option<TextEncoding>,
    pub(crate) cache_dir: Option<PathBuf>,
    pub(crate) force_rebuild: bool,
    pub(crate) persist_index: bool,
    pub(crate) block_cache_capacity: usize,
    pub(crate) max_redirects: usize,
    pub(crate) resources: ResourceSource,
    pub(crate) on_progress: Option<ProgressCallback>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            passcode: None,
            encoding: None,
            cache_dir: None,
            force_rebuild: false,
            persist_index: true,
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            resources: ResourceSource::Auto,
            on_progress: None,
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("passcode", &self.passcode)
            .field("encoding", &self.encoding)
            .field("cache_dir", &self.cache_dir)
            .field("force_rebuild", &self.force_rebuild)
            .field("persist_index", &self.persist_index)
            .field("block_cache_capacity", &self.block_cache_capacity)
            .field("max_redirects", &self.max_redirects)
            .field("resources", &self.resources)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration code (hex) and e-mail used to derive the master key.
    pub fn passcode(mut self, reg_code: impl Into<String>, email: impl Into<String>) -> Self {
        self.passcode = Some(Passcode {
            reg_code: reg_code.into(),
            email: email.into(),
        });
        self
    }

    /// Overrides the text encoding of dictionary keys and records.
    /// Resource containers always use UTF-16LE keys.
    pub fn encoding(mut self, label: &str) -> Self {
        self.encoding = Some(TextEncoding::from_label(label));
        self
    }

    /// Keeps side-car index files in `dir` instead of next to the containers.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Ignores existing side-car files and rebuilds the index.
    pub fn force_rebuild(mut self, yes: bool) -> Self {
        self.force_rebuild = yes;
        self
    }

    /// Whether side-car files are read and written at all. Defaults to `true`.
    pub fn persist_index(mut self, yes: bool) -> Self {
        self.persist_index = yes;
        self
    }

    /// Decompressed record blocks cached per container; `0` disables the cache.
    pub fn block_cache_capacity(mut self, blocks: usize) -> Self {
        self.block_cache_capacity = blocks;
        self
    }

    pub fn max_redirects(mut self, hops: usize) -> Self {
        self.max_redirects = hops;
        self
    }

    pub fn resources(mut self, source: ResourceSource) -> Self {
        self.resources = source;
        self
    }

    /// Called with `(percent, message)` while an index is being built.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u8, &str) + Send + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn open(self, path: impl AsRef<Path>) -> Result<Dictionary> {
        Dictionary::open_with(path.as_ref(), self)
    }

    pub(crate) fn passcode_pair(&self) -> Option<(&str, &str)> {
        self.passcode
            .as_ref()
            .map(|p| (p.reg_code.as_str(), p.email.as_str()))
    }
}
