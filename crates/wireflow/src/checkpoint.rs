// Copyright 2026 Wireflow contributors

//! Suspend/resume checkpoints.
//!
//! When an interrupt surfaces with no response available, the engine
//! serializes the run into a [`Checkpoint`]: the full value store (values
//! and versions), each node's last-seen input versions, the pending
//! interrupt descriptor and the iteration count. A resumed run restores the
//! snapshot, injects the responses as fresh writes and re-enters the normal
//! scheduling loop - completed nodes stay fresh and are not re-executed,
//! while everything downstream of the responses becomes stale and runs.
//!
//! [`Checkpointer`] backends persist checkpoints by run id so a process can
//! suspend, exit, and resume later. The engine hands the checkpoint back in
//! the run result either way; a checkpointer is only needed for durability.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, Result};
use crate::store::ValueStore;
use crate::value::Value;

/// The interrupt a suspended run is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptDescriptor {
    /// Name of the interrupt node.
    pub node: String,
    /// The value surfaced for review.
    pub value: Value,
    /// Store key the response must be supplied under when resuming.
    pub response_key: String,
}

/// Serializable snapshot of a suspended run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Identifier of the suspended run; resuming keeps it.
    pub run_id: String,
    /// The full value store at suspension time.
    pub store: ValueStore,
    /// Per-scope, per-node input versions observed at each node's last
    /// execution (scope -> node -> input -> version). Scope paths
    /// distinguish nested composite runs.
    pub seen_versions: BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>>,
    /// The interrupt that caused the suspension.
    pub pending_interrupt: Option<InterruptDescriptor>,
    /// Scheduling iterations consumed so far, counted against the budget.
    pub iterations: u32,
}

/// Persistence backend for [`Checkpoint`]s, keyed by run id.
pub trait Checkpointer: Send + Sync {
    /// Persist a checkpoint, overwriting any previous one for the run.
    ///
    /// # Errors
    ///
    /// [`CheckpointError`] on backend failure.
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Load the checkpoint for `run_id`.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`] if no checkpoint exists for the run.
    fn load(&self, run_id: &str) -> Result<Checkpoint>;

    /// Delete the checkpoint for `run_id`. Deleting a missing checkpoint is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// [`CheckpointError`] on backend failure.
    fn delete(&self, run_id: &str) -> Result<()>;
}

impl<T: Checkpointer + ?Sized> Checkpointer for Arc<T> {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        (**self).save(checkpoint)
    }

    fn load(&self, run_id: &str) -> Result<Checkpoint> {
        (**self).load(run_id)
    }

    fn delete(&self, run_id: &str) -> Result<()> {
        (**self).delete(run_id)
    }
}

/// In-memory checkpointer, for tests and single-process suspensions.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    checkpoints: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointer {
    /// New empty checkpointer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// True if no checkpoint is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

impl Checkpointer for MemoryCheckpointer {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints
            .insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Checkpoint> {
        self.checkpoints
            .get(run_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                CheckpointError::NotFound {
                    run_id: run_id.to_string(),
                }
                .into()
            })
    }

    fn delete(&self, run_id: &str) -> Result<()> {
        self.checkpoints.remove(run_id);
        Ok(())
    }
}

/// Disk-backed checkpointer: one JSON file per run id under a directory.
#[derive(Debug)]
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    /// Open (creating the directory if needed) a checkpointer rooted at
    /// `dir`.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::Io`] if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(CheckpointError::Io)?;
        Ok(Self { dir })
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        // Run ids are UUIDs, safe as file names.
        self.dir.join(format!("{run_id}.json"))
    }
}

impl Checkpointer for FileCheckpointer {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = serde_json::to_vec(checkpoint).map_err(|e| {
            CheckpointError::SerializationFailed {
                reason: e.to_string(),
            }
        })?;
        std::fs::write(self.path_for(&checkpoint.run_id), bytes)
            .map_err(CheckpointError::Io)?;
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Checkpoint> {
        let path = self.path_for(run_id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound {
                    run_id: run_id.to_string(),
                }
                .into());
            }
            Err(e) => return Err(CheckpointError::Io(e).into()),
        };
        let checkpoint = serde_json::from_slice(&bytes).map_err(|e| {
            CheckpointError::SerializationFailed {
                reason: e.to_string(),
            }
        })?;
        Ok(checkpoint)
    }

    fn delete(&self, run_id: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(run_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::Io(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn sample(run_id: &str) -> Checkpoint {
        let mut store = ValueStore::new();
        store.write("draft", json!("hello"));
        let mut node_versions = BTreeMap::new();
        node_versions.insert(
            "compose".to_string(),
            [("topic".to_string(), 1u64)]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
        );
        let mut seen = BTreeMap::new();
        seen.insert("graph".to_string(), node_versions);
        Checkpoint {
            run_id: run_id.to_string(),
            store,
            seen_versions: seen,
            pending_interrupt: Some(InterruptDescriptor {
                node: "review".to_string(),
                value: json!("hello"),
                response_key: "review.response".to_string(),
            }),
            iterations: 3,
        }
    }

    #[test]
    fn memory_checkpointer_round_trips() {
        let cp = MemoryCheckpointer::new();
        cp.save(&sample("run-1")).unwrap();
        let loaded = cp.load("run-1").unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.store.get("draft"), Some(&json!("hello")));
        assert_eq!(loaded.seen_versions["graph"]["compose"]["topic"], 1);
        assert_eq!(loaded.iterations, 3);

        cp.delete("run-1").unwrap();
        assert!(matches!(
            cp.load("run-1"),
            Err(Error::Checkpoint(CheckpointError::NotFound { .. }))
        ));
    }

    #[test]
    fn file_checkpointer_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cp = FileCheckpointer::new(dir.path()).unwrap();
        cp.save(&sample("run-2")).unwrap();

        let reopened = FileCheckpointer::new(dir.path()).unwrap();
        let loaded = reopened.load("run-2").unwrap();
        assert_eq!(loaded.pending_interrupt.unwrap().node, "review");

        reopened.delete("run-2").unwrap();
        // Idempotent delete.
        reopened.delete("run-2").unwrap();
        assert!(matches!(
            reopened.load("run-2"),
            Err(Error::Checkpoint(CheckpointError::NotFound { .. }))
        ));
    }
}
