// Copyright 2026 Wireflow contributors

//! Opaque values flowing through the graph.
//!
//! The engine stores values it never interprets: every node input and output
//! is a [`serde_json::Value`]. Keeping values opaque is what lets the store,
//! the cache layer and the checkpoint format stay serialization-free from the
//! caller's point of view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Opaque value carried along graph edges.
pub type Value = serde_json::Value;

/// Named value bundle passed into and out of nodes.
///
/// A `BTreeMap` rather than a `HashMap`: iteration order is the key order,
/// so serializing a `ValueMap` is deterministic. Cache keys and checkpoint
/// snapshots depend on that.
pub type ValueMap = BTreeMap<String, Value>;

/// Runtime kind of a [`Value`], used by type-switch gates and by the
/// advisory strict-type check at graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// JSON null.
    Null,
    /// Boolean.
    Bool,
    /// Integer or float.
    Number,
    /// String.
    String,
    /// Ordered sequence.
    Array,
    /// Key/value object.
    Object,
}

impl ValueKind {
    /// Kind of a runtime value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Lowercase display name, used in error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hex SHA-256 over a list of byte slices, with length prefixes so that
/// adjacent fields can never collide by concatenation.
#[must_use]
pub(crate) fn content_hash(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Cache key for one node execution: the node's definition fingerprint plus
/// a canonical serialization of its resolved inputs.
pub(crate) fn cache_key(fingerprint: &str, inputs: &ValueMap) -> Result<String> {
    let encoded = serde_json::to_vec(inputs)?;
    Ok(content_hash(&[fingerprint.as_bytes(), &encoded]))
}
