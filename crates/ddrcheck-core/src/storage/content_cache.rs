use super::table::Table;
use moka::sync::Cache;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CAPACITY_BYTES: u64 = 200 * 1024 * 1024;

/// In-memory LRU of loaded tables keyed by cache-file path, weighed by size.
///
/// Clones share the same underlying cache.
#[derive(Clone)]
pub struct ContentCache {
    inner: Cache<PathBuf, Arc<Table>>,
}

impl ContentCache {
    pub fn new(capacity_bytes: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity_bytes)
            .weigher(|_key: &PathBuf, table: &Arc<Table>| {
                u32::try_from(table.estimated_bytes()).unwrap_or(u32::MAX)
            })
            .build();
        Self { inner }
    }

    pub fn get(&self, key: &Path) -> Option<Arc<Table>> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: &Path, table: Arc<Table>) {
        self.inner.insert(key.to_path_buf(), table);
    }

    pub fn invalidate(&self, key: &Path) {
        self.inner.invalidate(key);
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("weighted_size", &self.inner.weighted_size())
            .finish()
    }
}
