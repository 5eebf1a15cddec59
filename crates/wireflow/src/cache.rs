// Copyright 2026 Wireflow contributors

//! Pluggable result caching.
//!
//! Cache keys are content-addressed: the node's definition fingerprint plus
//! a canonical hash of its resolved (non-ordering) input values. A hit
//! short-circuits execution but still advances value-store versions and
//! still emits a node-finished event flagged as a cache hit, so downstream
//! staleness behaves exactly as if the node had run.
//!
//! The engine never evicts; eviction policy belongs to the backend. Two
//! reference backends ship here: [`MemoryCache`] for tests and single
//! process use, [`FileCache`] for persistence across runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// A key/value result store consulted before cache-eligible executions.
pub trait CacheBackend: Send + Sync {
    /// Look up a previously stored result.
    ///
    /// # Errors
    ///
    /// Backend failures surface as [`Error::Cache`]; a clean miss is
    /// `Ok(None)`.
    fn lookup(&self, key: &str) -> Result<Option<Value>>;

    /// Store a result under `key`, overwriting any previous entry.
    ///
    /// # Errors
    ///
    /// Backend failures surface as [`Error::Cache`].
    fn store(&self, key: &str, value: &Value) -> Result<()>;
}

impl<T: CacheBackend + ?Sized> CacheBackend for Arc<T> {
    fn lookup(&self, key: &str) -> Result<Option<Value>> {
        (**self).lookup(key)
    }

    fn store(&self, key: &str, value: &Value) -> Result<()> {
        (**self).store(key, value)
    }
}

/// In-memory cache backend.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Value>,
}

impl MemoryCache {
    /// New empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entry has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for MemoryCache {
    fn lookup(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn store(&self, key: &str, value: &Value) -> Result<()> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Disk-backed cache: one JSON file per key under a directory.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (creating the directory if needed) a cache rooted at `dir`.
    ///
    /// # Errors
    ///
    /// [`Error::Cache`] if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Cache(format!("cannot create cache dir {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are hex digests, safe as file names.
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheBackend for FileCache {
    fn lookup(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Cache(format!("corrupt cache entry {key}: {e}")))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Cache(format!("cannot read cache entry {key}: {e}"))),
        }
    }

    fn store(&self, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::Cache(format!("cannot encode cache entry {key}: {e}")))?;
        std::fs::write(self.path_for(key), bytes)
            .map_err(|e| Error::Cache(format!("cannot write cache entry {key}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_cache_round_trips() {
        let cache = MemoryCache::new();
        assert!(cache.lookup("k").unwrap().is_none());
        cache.store("k", &json!({"y": 10})).unwrap();
        assert_eq!(cache.lookup("k").unwrap(), Some(json!({"y": 10})));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn file_cache_round_trips_and_misses_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        assert!(cache.lookup("deadbeef").unwrap().is_none());
        cache.store("deadbeef", &json!([1, 2, 3])).unwrap();
        assert_eq!(cache.lookup("deadbeef").unwrap(), Some(json!([1, 2, 3])));

        // A fresh handle over the same directory sees the entry.
        let reopened = FileCache::new(dir.path()).unwrap();
        assert_eq!(reopened.lookup("deadbeef").unwrap(), Some(json!([1, 2, 3])));
    }
}
