// Copyright 2026 Wireflow contributors

//! Versioned value store.
//!
//! The store is the single source of truth during a run: every node output,
//! run input and bound value lands here as a `(name, value, version)` entry.
//! Versions come from one monotonic clock per store, so all writes are
//! total-ordered even when node execution is concurrent (the engine applies
//! writes serially). Staleness detection compares a node's last-seen input
//! versions against the current entries.
//!
//! The store is owned by the execution engine for the duration of a run.
//! Callers only ever see it through checkpoint snapshots and run outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueMap};

/// A single store entry: the current value and the clock tick at which it
/// was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    /// The current value.
    pub value: Value,
    /// Version stamp; strictly increasing across all writes to the store.
    pub version: u64,
}

/// Versioned key/value map driving staleness detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueStore {
    entries: BTreeMap<String, StoredValue>,
    clock: u64,
}

impl ValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value, bumping the store clock. Returns the version assigned
    /// to this write.
    pub fn write(&mut self, name: impl Into<String>, value: Value) -> u64 {
        self.clock += 1;
        let version = self.clock;
        self.entries.insert(name.into(), StoredValue { value, version });
        version
    }

    /// Write every entry of a map, in key order.
    pub fn write_all(&mut self, values: ValueMap) {
        for (name, value) in values {
            self.write(name, value);
        }
    }

    /// Current value under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    /// Current version of `name`, if present.
    #[must_use]
    pub fn version(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|entry| entry.version)
    }

    /// True if `name` has ever been written.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate over all entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredValue)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Number of distinct names in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current clock value; the version of the most recent write.
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn versions_increase_monotonically_across_names() {
        let mut store = ValueStore::new();
        let v1 = store.write("a", json!(1));
        let v2 = store.write("b", json!(2));
        let v3 = store.write("a", json!(3));
        assert!(v1 < v2 && v2 < v3);
        assert_eq!(store.get("a"), Some(&json!(3)));
        assert_eq!(store.version("a"), Some(v3));
        assert_eq!(store.version("b"), Some(v2));
    }

    #[test]
    fn rewrite_replaces_value_and_advances_version() {
        let mut store = ValueStore::new();
        store.write("x", json!("old"));
        let before = store.version("x").unwrap();
        store.write("x", json!("new"));
        assert_eq!(store.get("x"), Some(&json!("new")));
        assert!(store.version("x").unwrap() > before);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_round_trips_through_serde() {
        let mut store = ValueStore::new();
        store.write("x", json!({"nested": [1, 2]}));
        store.write("y", json!(null));
        let encoded = serde_json::to_string(&store).unwrap();
        let restored: ValueStore = serde_json::from_str(&encoded).unwrap();
        assert_eq!(restored.get("x"), store.get("x"));
        assert_eq!(restored.version("y"), store.version("y"));
        assert_eq!(restored.clock(), store.clock());
    }
}
