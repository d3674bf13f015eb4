//! Bounded cache of decompressed record blocks.
//!
//! Backed by `moka::sync::Cache` (TinyLFU eviction). Misses go through
//! `try_get_with`, so concurrent readers of the same block wait on a single
//! decode instead of racing. Failed decodes are never stored.

use std::sync::Arc;

use log::trace;
use moka::sync::Cache;

use super::types::error::{MdictError, Result};

/// Number of decompressed record blocks kept per container by default.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 16;

#[derive(Debug)]
pub struct BlockCache {
    capacity: usize,
    /// `None` when the capacity is zero; every read then decodes afresh.
    inner: Option<Cache<usize, Arc<Vec<u8>>>>,
}

impl BlockCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        let inner = (capacity > 0).then(|| Cache::builder().max_capacity(capacity as u64).build());
        Self { capacity, inner }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks currently held, after moka has applied pending evictions.
    pub fn len(&self) -> usize {
        match &self.inner {
            Some(cache) => {
                cache.run_pending_tasks();
                cache.entry_count() as usize
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached block, or runs `load` and caches its result.
    pub fn get_or_load<F>(&self, block_index: usize, load: F) -> Result<Arc<Vec<u8>>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let Some(cache) = &self.inner else {
            return load().map(Arc::new);
        };
        if let Some(block) = cache.get(&block_index) {
            trace!("Block cache hit: record block {}", block_index);
            return Ok(block);
        }
        cache
            .try_get_with(block_index, || {
                trace!("Block cache miss: record block {}", block_index);
                load().map(Arc::new)
            })
            .map_err(unshare)
    }
}

/// Recovers an owned error from moka's shared one.
///
/// Waiters on the same failed load all see one `Arc`; only the last holder
/// can take it back, the others get a copy.
fn unshare(err: Arc<MdictError>) -> MdictError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match &*shared {
        MdictError::CorruptBlock { block, reason } => MdictError::CorruptBlock {
            block: *block,
            reason: reason.clone(),
        },
        other => MdictError::InvalidFormat(other.to_string()),
    })
}
