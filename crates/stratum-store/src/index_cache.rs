//! Per-process cache of parsed unit indexes.
//!
//! Index files are loaded lazily per unit query; this cache amortizes the
//! parse across queries. It is keyed by `(unit dir, index file name)`,
//! safe for concurrent readers, bounded by an approximate byte cap with
//! oldest-first eviction, and invalidated for a unit dir when that unit is
//! re-imported.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::idx::{DefPathIndex, RefDefIndex, RefFileIndex};

const DEFAULT_MAX_BYTES: usize = 32 * 1024 * 1024;

/// A parsed index held by the cache.
#[derive(Debug)]
pub(crate) enum CachedIndex {
    DefPaths(DefPathIndex),
    RefDefs(RefDefIndex),
    RefFiles(RefFileIndex),
}

impl CachedIndex {
    fn approx_bytes(&self) -> usize {
        match self {
            Self::DefPaths(idx) => idx.approx_bytes(),
            Self::RefDefs(idx) => idx.approx_bytes(),
            Self::RefFiles(idx) => idx.approx_bytes(),
        }
    }
}

type Key = (String, String);

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<Key, Arc<CachedIndex>>,
    order: VecDeque<Key>,
    bytes: usize,
}

#[derive(Debug)]
pub(crate) struct IndexCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl Default for IndexCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl IndexCache {
    pub fn get(&self, dir: &str, name: &str) -> Option<Arc<CachedIndex>> {
        let key = (dir.to_string(), name.to_string());
        let mut inner = self.inner.lock();
        let value = inner.map.get(&key)?.clone();
        if let Some(pos) = inner.order.iter().position(|k| *k == key) {
            inner.order.remove(pos);
        }
        inner.order.push_back(key);
        Some(value)
    }

    pub fn insert(&self, dir: &str, name: &str, value: Arc<CachedIndex>) {
        let key = (dir.to_string(), name.to_string());
        let mut inner = self.inner.lock();
        let added = value.approx_bytes();
        if let Some(prev) = inner.map.insert(key.clone(), value) {
            inner.bytes = inner.bytes.saturating_sub(prev.approx_bytes());
        }
        inner.bytes = inner.bytes.saturating_add(added);
        if let Some(pos) = inner.order.iter().position(|k| *k == key) {
            inner.order.remove(pos);
        }
        inner.order.push_back(key);

        while inner.bytes > self.max_bytes {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.map.remove(&oldest) {
                inner.bytes = inner.bytes.saturating_sub(evicted.approx_bytes());
            }
        }
    }

    /// Drops every cached index for `dir`. Called after a re-import so
    /// stale byte ranges never address the new data files.
    pub fn invalidate_dir(&self, dir: &str) {
        let mut inner = self.inner.lock();
        let removed: Vec<Key> = inner
            .map
            .keys()
            .filter(|(d, _)| d == dir)
            .cloned()
            .collect();
        for key in removed {
            if let Some(evicted) = inner.map.remove(&key) {
                inner.bytes = inner.bytes.saturating_sub(evicted.approx_bytes());
            }
            if let Some(pos) = inner.order.iter().position(|k| *k == key) {
                inner.order.remove(pos);
            }
        }
    }
}
