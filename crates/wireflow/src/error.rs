// Copyright 2026 Wireflow contributors

//! Error types for Wireflow.
//!
//! Errors fall into four families, mirroring when they can occur:
//!
//! 1. [`ConstructionError`] - structural mistakes, raised while building a
//!    graph and never during execution;
//! 2. runtime variants of [`Error`] - a node or gate misbehaved mid-run;
//! 3. [`Error::IncompatibleGraph`] - the caller asked for a run mode the
//!    graph does not support, raised before any node executes;
//! 4. [`CheckpointError`] - persistence failures in checkpoint backends.
//!
//! Every message names the offending node or parameter and, where a fix is
//! mechanical, says what to change.

use std::time::Duration;

use thiserror::Error;

use crate::value::ValueKind;

/// Structural errors detected while building a [`crate::graph::Graph`].
///
/// These are always raised before any node runs: a graph that constructs
/// successfully cannot fail for structural reasons mid-execution.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConstructionError {
    /// A graph was built from an empty node list.
    #[error("Cannot build a graph from an empty node list. Add at least one node before calling build().")]
    EmptyGraph,

    /// Two nodes share a name.
    #[error("Node '{node}' is declared twice. Node names must be unique; rename one of the two.")]
    DuplicateNode {
        /// The duplicated name.
        node: String,
    },

    /// Two nodes produce the same output without being alternatives behind
    /// a common gate.
    #[error("Output '{output}' is produced by both '{first}' and '{second}', which are not mutually exclusive branches of one gate. Rename one output, or route both producers through the same gate.")]
    DuplicateOutput {
        /// The contested value name.
        output: String,
        /// First producer.
        first: String,
        /// Second producer.
        second: String,
    },

    /// A gate declares a target that is neither a node nor [`crate::graph::END`].
    #[error("Gate '{gate}' declares target '{target}', but no node with that name exists. Declare targets that match node names, or use END to terminate the run.")]
    UnknownGateTarget {
        /// The gate with the bad declaration.
        gate: String,
        /// The undeclared target.
        target: String,
    },

    /// A gate routes to itself.
    #[error("Gate '{gate}' declares itself as a routing target. Gates cannot re-trigger themselves; route to another node instead.")]
    GateTargetsSelf {
        /// The self-referential gate.
        gate: String,
    },

    /// Caching requested on a node kind that does not support it.
    #[error("Node '{node}' is a {kind} node and cannot be cached. Caching applies to function nodes only; for composites, enable caching on the inner nodes instead.")]
    CacheUnsupported {
        /// The offending node.
        node: String,
        /// Human-readable node kind ("composite", "interrupt", "gate").
        kind: &'static str,
    },

    /// Strict type checking found an incompatible edge.
    #[error("Type mismatch on value '{value}': '{producer}' declares {produced} but consumer '{consumer}' expects {expected}. Align the declared kinds, or build without strict_types to skip this check.")]
    TypeMismatch {
        /// The value name carried by the edge.
        value: String,
        /// Producing node.
        producer: String,
        /// Kind declared by the producer.
        produced: ValueKind,
        /// Consuming node.
        consumer: String,
        /// Kind declared by the consumer.
        expected: ValueKind,
    },

    /// `map_over` used on a non-composite node or with an undeclared input.
    #[error("Invalid map_over on node '{node}': {reason}. map_over applies to composite nodes and must name their declared inputs.")]
    InvalidMapOver {
        /// The offending node.
        node: String,
        /// What exactly was wrong.
        reason: String,
    },

    /// `bind`/`unbind` named something that is not a graph input.
    #[error("'{name}' is not an input of graph '{graph}'. Bindable inputs are the names listed in the graph's InputSpec.")]
    UnknownBinding {
        /// The unknown name.
        name: String,
        /// The graph it was bound against.
        graph: String,
    },
}

/// Checkpoint persistence errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint state could not be serialized.
    #[error("Checkpoint serialization failed: {reason}")]
    SerializationFailed {
        /// Detailed reason.
        reason: String,
    },

    /// No checkpoint stored under the given run id.
    #[error("Checkpoint for run '{run_id}' not found")]
    NotFound {
        /// The missing run id.
        run_id: String,
    },

    /// I/O error in a file-backed backend.
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("Checkpoint error: {0}")]
    Other(String),
}

/// Wireflow error type.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Structural error raised while building a graph.
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// A node's function returned an error; the run transitions to failed
    /// and no further nodes execute.
    #[error("Node '{node}' failed: {source}")]
    NodeExecution {
        /// Name of the failing node.
        node: String,
        /// The underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A gate function returned a target it never declared.
    #[error("Gate '{gate}' returned undeclared target '{target}'. Declared targets are: {declared}. Return one of the declared targets, or add '{target}' to the gate's target list.")]
    UndeclaredTarget {
        /// The offending gate.
        gate: String,
        /// The invalid target it returned.
        target: String,
        /// Comma-joined declared target list.
        declared: String,
    },

    /// A decision gate returned no decision and no default target was
    /// declared.
    #[error("Gate '{gate}' returned no decision and has no default target. Return a target, or declare a fallback with with_default_target().")]
    NoRouteDecision {
        /// The offending gate.
        gate: String,
    },

    /// A node's returned map is missing a declared output.
    #[error("Node '{node}' did not produce declared output '{output}'. Every declared output must be present in the returned value map.")]
    OutputMismatch {
        /// The offending node.
        node: String,
        /// The missing output name.
        output: String,
    },

    /// A required run input (or unseeded cycle input) was not provided.
    #[error("Required input '{input}' was not provided. Pass it in the inputs map, or bind it on the graph with bind().")]
    MissingInput {
        /// The missing input name.
        input: String,
    },

    /// The requested run mode cannot execute this graph. Raised before any
    /// node runs.
    #[error("Cannot {operation} this graph: {reason}")]
    IncompatibleGraph {
        /// The attempted operation ("run_sync", "map", ...).
        operation: &'static str,
        /// Why the graph is incompatible.
        reason: String,
    },

    /// A cyclic graph exhausted its iteration budget without any gate
    /// selecting [`crate::graph::END`].
    #[error("Iteration budget of {budget} exhausted without reaching END. This usually means a routing gate never selects END; check the gate's termination condition, or raise the budget with with_iteration_budget().")]
    InfiniteLoop {
        /// The configured budget.
        budget: u32,
    },

    /// The run exceeded its wall-clock timeout.
    #[error("Run timed out after {0:?}. Increase the limit with with_timeout() or disable it with without_timeout().")]
    Timeout(Duration),

    /// Zip-mode fan-out over inputs of different lengths.
    #[error("Cannot zip over input '{input}': it has {got} elements but {expected} were expected. Zip mode requires all mapped inputs to have equal lengths; use product mode for uneven inputs.")]
    ZipLengthMismatch {
        /// The offending input name.
        input: String,
        /// Its actual length.
        got: usize,
        /// Length of the first mapped input.
        expected: usize,
    },

    /// Fan-out requested over a non-array value.
    #[error("Cannot map over input '{input}': its value is not an array. Mapped inputs must be arrays of per-iteration values.")]
    NotIterable {
        /// The offending input name.
        input: String,
    },

    /// Checkpoint backend failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Cache backend failure.
    #[error("Cache backend error: {0}")]
    Cache(String),

    /// Value (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller-supplied error, for use inside node functions.
    #[error("{0}")]
    Generic(String),

    /// Engine invariant violation. Seeing this is a bug in Wireflow.
    #[error("Internal execution error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for node bodies that fail with a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Generic(message.into())
    }

    /// Name of the node this error is attributed to, if any.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Error::NodeExecution { node, .. } | Error::OutputMismatch { node, .. } => Some(node),
            Error::UndeclaredTarget { gate, .. } | Error::NoRouteDecision { gate } => Some(gate),
            _ => None,
        }
    }
}

/// Result type for Wireflow operations.
pub type Result<T> = std::result::Result<T, Error>;
