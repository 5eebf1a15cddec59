// Copyright 2026 Wireflow contributors

//! Wireflow: a graph-native execution engine.
//!
//! Plain functions become nodes; wiring is inferred by matching output
//! names to input names, so there is no edge-listing API at all. The
//! scheduler is staleness-driven: a node runs when all of its inputs are
//! available and at least one has been rewritten since the node last ran.
//! That single rule executes DAGs, cyclic feedback loops (terminated by a
//! routing gate selecting [`END`]), nested composite graphs, and
//! human-in-the-loop interrupts with suspend/resume, without separate
//! machinery for each.
//!
//! # Quickstart
//!
//! ```
//! use serde_json::json;
//! use wireflow::{Graph, Node, Runner};
//!
//! let double = Node::function("double", ["x"], ["y"], |args| {
//!     let x = args["x"].as_i64().unwrap_or(0);
//!     Ok([("y".to_string(), json!(x * 2))].into())
//! });
//! let add_ten = Node::function("add_ten", ["y"], ["z"], |args| {
//!     let y = args["y"].as_i64().unwrap_or(0);
//!     Ok([("z".to_string(), json!(y + 10))].into())
//! });
//!
//! // "y" links the two nodes; nobody declared an edge.
//! let graph = Graph::new(vec![double, add_ten])?;
//! let outputs = Runner::new().run_sync(&graph, [("x".to_string(), json!(5))].into())?;
//! assert_eq!(outputs["y"], json!(10));
//! assert_eq!(outputs["z"], json!(20));
//! # Ok::<(), wireflow::Error>(())
//! ```
//!
//! # Model
//!
//! - [`Node`]: one of a closed set of kinds - function (sync, async or
//!   generator), routing [gate](Node::gate), [interrupt](Node::interrupt),
//!   or composite ([`Graph::as_node`]).
//! - [`Graph`]: an immutable, validated node set. All structural checks
//!   happen at build time; [`Graph::bind`] attaches input values and
//!   returns a new graph.
//! - [`Runner`]: execution policy plus the run entry points -
//!   [`run`](Runner::run), [`resume`](Runner::resume),
//!   [`run_sync`](Runner::run_sync) and batch [`map`](Runner::map).
//! - [`ValueStore`]: the versioned store backing staleness detection,
//!   visible through checkpoints and run outputs.
//!
//! Opt-in result caching ([`Node::with_cache`] plus a [`CacheBackend`] on
//! the runner) and durable suspensions ([`Checkpointer`]) are layered on
//! the same store.

pub mod cache;
pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod node;
pub mod store;
pub mod value;

pub use cache::{CacheBackend, FileCache, MemoryCache};
pub use checkpoint::{
    Checkpoint, Checkpointer, FileCheckpointer, InterruptDescriptor, MemoryCheckpointer,
};
pub use engine::{
    RunResult, RunStatus, Runner, StopHandle, DEFAULT_CONCURRENCY, DEFAULT_ITERATION_BUDGET,
    DEFAULT_RUN_TIMEOUT,
};
pub use error::{CheckpointError, ConstructionError, Error, Result};
pub use event::{CollectingObserver, EventObserver, GraphEvent};
pub use graph::{Edge, Graph, GraphBuilder, InputSpec, END};
pub use node::{
    interrupt_response_key, CompositeNode, FunctionNode, GateKind, GateNode, GeneratorFuture,
    InputSlot, InterruptNode, MapMode, MapSpec, Node, NodeFuture, NodeKind, OutputSlot,
};
pub use store::{StoredValue, ValueStore};
pub use value::{Value, ValueKind, ValueMap};
