//! Key matching with fallback strategies and redirect following.

use log::debug;

use super::persist::{IndexOrigin, IndexTable};
use super::resolver::RecordResolver;
use super::types::error::{MdictError, Result};
use super::types::filetypes::{FileType, RecordData};

/// Default bound on `@@@LINK=` hops for one lookup.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// One way of matching a query against stored keys. Tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    /// Unicode lowercase on both sides.
    CaseInsensitive,
    /// Interior hyphens removed on both sides, then case-insensitive.
    HyphenInsensitive,
}

/// What the keys of a container name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Dictionary headwords.
    Headword,
    /// Resource paths such as `\img\a.png`.
    Resource,
}

impl MatchMode {
    pub fn strategies(&self) -> &'static [MatchStrategy] {
        match self {
            MatchMode::Headword => &[
                MatchStrategy::Exact,
                MatchStrategy::CaseInsensitive,
                MatchStrategy::HyphenInsensitive,
            ],
            MatchMode::Resource => &[MatchStrategy::Exact, MatchStrategy::CaseInsensitive],
        }
    }

    /// Canonical form of a query or redirect target.
    pub fn normalize(&self, key: &str) -> String {
        match self {
            MatchMode::Headword => key.trim().to_string(),
            MatchMode::Resource => normalize_resource_path(key),
        }
    }
}

/// Resource keys use backslashes and start with one: `img/a.png` becomes `\img\a.png`.
pub fn normalize_resource_path(path: &str) -> String {
    let path = path.trim().replace('/', "\\");
    if path.starts_with('\\') {
        path
    } else {
        format!("\\{}", path)
    }
}

/// Index plus record access for one container.
#[derive(Debug)]
pub struct LookupEngine<T: FileType> {
    resolver: RecordResolver<T>,
    table: IndexTable,
    origin: IndexOrigin,
    mode: MatchMode,
    max_redirects: usize,
}

impl<T: FileType> LookupEngine<T> {
    pub fn new(
        resolver: RecordResolver<T>,
        table: IndexTable,
        origin: IndexOrigin,
        mode: MatchMode,
        max_redirects: usize,
    ) -> Self {
        Self {
            resolver,
            table,
            origin,
            mode,
            max_redirects,
        }
    }

    pub fn resolver(&self) -> &RecordResolver<T> {
        &self.resolver
    }

    pub fn table(&self) -> &IndexTable {
        &self.table
    }

    pub fn origin(&self) -> IndexOrigin {
        self.origin
    }

    /// Rows matched by the first strategy that matches anything.
    pub fn candidates(&self, key: &str) -> &[u32] {
        for strategy in self.mode.strategies() {
            let hits = match strategy {
                MatchStrategy::Exact => self.table.exact(key),
                MatchStrategy::CaseInsensitive => self.table.case_insensitive(key),
                MatchStrategy::HyphenInsensitive => self.table.hyphen_insensitive(key),
            };
            if !hits.is_empty() {
                debug!("'{}' matched {} row(s) by {:?}", key, hits.len(), strategy);
                return hits;
            }
        }
        &[]
    }

    /// Content of the first matching entry, following redirects.
    pub fn lookup(&self, query: &str) -> Result<Option<T::Record>> {
        let key = self.mode.normalize(query);
        match self.candidates(&key).first() {
            Some(&row) => self.follow(row, key),
            None => Ok(None),
        }
    }

    /// Content of every entry matched by the winning strategy, in on-disk order.
    pub fn lookup_all(&self, query: &str) -> Result<Vec<T::Record>> {
        let key = self.mode.normalize(query);
        let mut found = Vec::new();
        for &row in self.candidates(&key) {
            if let Some(record) = self.follow(row, key.clone())? {
                found.push(record);
            }
        }
        Ok(found)
    }

    /// Resolves `row`, following `@@@LINK=` redirects.
    ///
    /// Revisiting a row, or exceeding `max_redirects` hops, is a
    /// [`MdictError::RedirectLoop`]. A redirect to a missing key yields `None`.
    fn follow(&self, mut row: u32, query: String) -> Result<Option<T::Record>> {
        let mut chain = vec![query];
        let mut visited = vec![row];

        loop {
            let entry = self.table.row(row);
            match self.resolver.resolve(entry, self.table.span_end(row))? {
                RecordData::Content(record) => return Ok(Some(record)),
                RecordData::Redirect(target) => {
                    let target = self.mode.normalize(&target);
                    debug!("'{}' redirects to '{}'", entry.key_text, target);
                    chain.push(target.clone());
                    if chain.len() - 1 > self.max_redirects {
                        return Err(MdictError::RedirectLoop { chain });
                    }
                    let Some(&next) = self.candidates(&target).first() else {
                        debug!("Redirect target '{}' not found", target);
                        return Ok(None);
                    };
                    if visited.contains(&next) {
                        return Err(MdictError::RedirectLoop { chain });
                    }
                    visited.push(next);
                    row = next;
                }
            }
        }
    }
}
