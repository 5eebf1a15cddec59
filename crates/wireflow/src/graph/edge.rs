// Copyright 2026 Wireflow contributors

//! Inferred edges and the terminal routing sentinel.

use serde::{Deserialize, Serialize};

/// Terminal routing target: a gate selecting `END` finishes the run.
///
/// This is the only way a cyclic graph terminates normally; acyclic graphs
/// may also complete naturally once no node is ready.
pub const END: &str = "__end__";

/// A dependency inferred at build time from one node's output name matching
/// another node's input name.
///
/// Edges are never declared by the caller; the graph builder derives the
/// full list before any execution, so wiring mistakes surface as
/// construction errors rather than mid-run surprises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Producing node.
    pub from: String,
    /// Consuming node.
    pub to: String,
    /// The value name carried by this edge.
    pub value: String,
    /// Ordering-only edge: sequences execution, carries no data. Excluded
    /// from cache keys and surfaced outputs, but counted for readiness and
    /// cycle analysis.
    pub ordering: bool,
}
