//! In-memory view of a persisted index, with the lookup maps used by the
//! fallback strategies.

use std::collections::HashMap;

use super::schema::{IndexMeta, PersistedIndex};
use crate::mdict::types::models::IndexEntry;

/// Unicode lowercase form used for case-insensitive matching.
pub fn fold_case(key: &str) -> String {
    key.to_lowercase()
}

/// Drops hyphens between other characters; leading and trailing hyphens stay.
///
/// `co-operate` and `cooperate` normalise alike, `-ing` stays `-ing`.
pub fn strip_interior_hyphens(key: &str) -> String {
    let core = key.trim_matches('-');
    if core.is_empty() {
        return key.to_string();
    }
    let lead = key.len() - key.trim_start_matches('-').len();
    let trail = key.len() - key.trim_end_matches('-').len();
    let mut out = String::with_capacity(key.len());
    out.push_str(&key[..lead]);
    out.extend(core.chars().filter(|&c| c != '-'));
    out.push_str(&key[key.len() - trail..]);
    out
}

fn hyphen_key(key: &str) -> String {
    fold_case(&strip_interior_hyphens(key))
}

/// Immutable index of one container.
#[derive(Debug)]
pub struct IndexTable {
    meta: IndexMeta,
    rows: Vec<IndexEntry>,
    /// Exclusive end of each row's payload in the logical record stream.
    span_ends: Vec<u64>,
    exact: HashMap<String, Vec<u32>>,
    folded: HashMap<String, Vec<u32>>,
    stripped: HashMap<String, Vec<u32>>,
}

impl IndexTable {
    pub fn new(index: PersistedIndex) -> Self {
        let PersistedIndex { meta, rows } = index;

        let mut offsets: Vec<u64> = rows.iter().map(|r| r.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        let span_ends = rows
            .iter()
            .map(|row| {
                let next = offsets.partition_point(|&o| o <= row.offset);
                offsets
                    .get(next)
                    .map_or(row.record_end, |&o| o.min(row.record_end))
            })
            .collect();

        let mut exact: HashMap<String, Vec<u32>> = HashMap::with_capacity(rows.len());
        let mut folded: HashMap<String, Vec<u32>> = HashMap::with_capacity(rows.len());
        let mut stripped: HashMap<String, Vec<u32>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            let i = i as u32;
            exact.entry(row.key_text.clone()).or_default().push(i);
            folded.entry(fold_case(&row.key_text)).or_default().push(i);
            stripped.entry(hyphen_key(&row.key_text)).or_default().push(i);
        }

        Self {
            meta,
            rows,
            span_ends,
            exact,
            folded,
            stripped,
        }
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn rows(&self) -> &[IndexEntry] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: u32) -> &IndexEntry {
        &self.rows[i as usize]
    }

    pub fn span_end(&self, i: u32) -> u64 {
        self.span_ends[i as usize]
    }

    pub fn exact(&self, key: &str) -> &[u32] {
        self.exact.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn case_insensitive(&self, key: &str) -> &[u32] {
        self.folded.get(&fold_case(key)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn hyphen_insensitive(&self, key: &str) -> &[u32] {
        self.stripped.get(&hyphen_key(key)).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::mdict::persist::schema::SourceFingerprint;

    #[test]
    fn interior_hyphens_only() {
        assert_eq!(strip_interior_hyphens("co-operate"), "cooperate");
        assert_eq!(strip_interior_hyphens("-ing"), "-ing");
        assert_eq!(strip_interior_hyphens("self-"), "self-");
        assert_eq!(strip_interior_hyphens("a-b-c"), "abc");
        assert_eq!(strip_interior_hyphens("--"), "--");
    }

    fn table(rows: &[(&str, u64)], block_end: u64) -> IndexTable {
        let path: Arc<Path> = Arc::from(Path::new("/d.mdx"));
        let rows = rows
            .iter()
            .map(|&(key, offset)| IndexEntry {
                key_text: key.to_string(),
                file_path: Arc::clone(&path),
                file_pos: 0,
                compressed_size: block_end + 8,
                decompressed_size: block_end,
                record_block_type: 0,
                record_start: 0,
                record_end: block_end,
                offset,
            })
            .collect::<Vec<_>>();
        IndexTable::new(PersistedIndex {
            meta: IndexMeta {
                encoding: "UTF-8".into(),
                title: String::new(),
                version: "2.0".into(),
                description: String::new(),
                entry_count: rows.len() as u64,
                source: SourceFingerprint {
                    path: "/d.mdx".into(),
                    size: 0,
                    mtime_nanos: 0,
                },
            },
            rows,
        })
    }

    #[test]
    fn spans_end_at_next_distinct_offset() {
        // "b" and "c" share a payload.
        let t = table(&[("a", 0), ("b", 10), ("c", 10), ("d", 25)], 40);
        assert_eq!(t.span_end(0), 10);
        assert_eq!(t.span_end(1), 25);
        assert_eq!(t.span_end(2), 25);
        assert_eq!(t.span_end(3), 40);
    }

    #[test]
    fn lookup_maps() {
        let t = table(&[("Hello", 0), ("co-operate", 5), ("hello", 9)], 20);
        assert_eq!(t.exact("Hello"), &[0]);
        assert_eq!(t.case_insensitive("HELLO"), &[0, 2]);
        assert_eq!(t.hyphen_insensitive("cooperate"), &[1]);
        assert_eq!(t.hyphen_insensitive("Co-Operate"), &[1]);
        assert!(t.exact("missing").is_empty());
    }
}
