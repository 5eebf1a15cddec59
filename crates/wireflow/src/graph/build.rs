// Copyright 2026 Wireflow contributors

//! Graph construction and validation.
//!
//! All structural checks run here, before any node ever executes:
//! duplicate names, duplicate outputs, invalid gate targets, misplaced
//! cache flags and fan-out declarations, and (under strict types) per-edge
//! kind compatibility. A graph that builds cannot fail structurally at run
//! time - that is the design invariant the whole engine leans on.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::has_path_connecting;
use petgraph::prelude::DiGraphMap;
use tracing::debug;

use crate::error::{ConstructionError, Result};
use crate::node::{Node, NodeKind};

use super::edge::{Edge, END};
use super::inputs::InputSpec;
use super::Graph;

/// Default name for graphs built without one.
const DEFAULT_GRAPH_NAME: &str = "graph";

/// Builder for [`Graph`].
///
/// # Example
///
/// ```rust,ignore
/// let graph = Graph::builder()
///     .name("pipeline")
///     .strict_types(true)
///     .node(double)
///     .node(add_ten)
///     .build()?;
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    name: Option<String>,
    strict_types: bool,
    nodes: Vec<Node>,
}

impl GraphBuilder {
    /// New empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the graph name (used in logs, events and error messages).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable the advisory per-edge kind check. Incompatibilities become
    /// construction errors instead of being ignored.
    #[must_use]
    pub fn strict_types(mut self, enabled: bool) -> Self {
        self.strict_types = enabled;
        self
    }

    /// Add a node.
    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add several nodes in order.
    #[must_use]
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Validate and build the graph.
    ///
    /// # Errors
    ///
    /// Any [`ConstructionError`]; never panics and never runs a node.
    pub fn build(self) -> Result<Graph> {
        if self.nodes.is_empty() {
            return Err(ConstructionError::EmptyGraph.into());
        }

        let nodes: Vec<Arc<Node>> = self.nodes.into_iter().map(Arc::new).collect();

        // Pass 1: index by name, rejecting duplicates.
        let mut index: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name().to_string(), i).is_some() {
                return Err(ConstructionError::DuplicateNode {
                    node: node.name().to_string(),
                }
                .into());
            }
        }

        // Pass 2: per-node flag validation.
        for node in &nodes {
            if node.cache_enabled() && !matches!(node.kind(), NodeKind::Function(_)) {
                return Err(ConstructionError::CacheUnsupported {
                    node: node.name().to_string(),
                    kind: node.kind_name(),
                }
                .into());
            }
            if let Some(spec) = node.map_spec() {
                if !matches!(node.kind(), NodeKind::Composite(_)) {
                    return Err(ConstructionError::InvalidMapOver {
                        node: node.name().to_string(),
                        reason: format!("node is a {} node", node.kind_name()),
                    }
                    .into());
                }
                for name in &spec.names {
                    if node.input_slot(name).is_none() {
                        return Err(ConstructionError::InvalidMapOver {
                            node: node.name().to_string(),
                            reason: format!("'{name}' is not one of its inputs"),
                        }
                        .into());
                    }
                }
            }
            if let NodeKind::Gate(gate) = node.kind() {
                for target in gate.targets() {
                    if target == node.name() {
                        return Err(ConstructionError::GateTargetsSelf {
                            gate: node.name().to_string(),
                        }
                        .into());
                    }
                    if target != END && !index.contains_key(target) {
                        return Err(ConstructionError::UnknownGateTarget {
                            gate: node.name().to_string(),
                            target: target.clone(),
                        }
                        .into());
                    }
                }
            }
        }

        // Pass 3: shared output names are only legal across mutually
        // exclusive branches of one gate.
        let mut producers_by_output: HashMap<&str, Vec<&Arc<Node>>> = HashMap::new();
        for node in &nodes {
            for slot in node.outputs() {
                producers_by_output
                    .entry(slot.name.as_str())
                    .or_default()
                    .push(node);
            }
        }
        for (output, producers) in &producers_by_output {
            for (i, a) in producers.iter().enumerate() {
                for b in &producers[i + 1..] {
                    if !mutually_exclusive(&nodes, a.name(), b.name()) {
                        return Err(ConstructionError::DuplicateOutput {
                            output: (*output).to_string(),
                            first: a.name().to_string(),
                            second: b.name().to_string(),
                        }
                        .into());
                    }
                }
            }
        }

        // Pass 4: infer edges by name matching. A node never feeds itself.
        let mut edges: Vec<Edge> = Vec::new();
        for consumer in &nodes {
            for input in consumer.inputs() {
                for producer in &nodes {
                    if producer.name() == consumer.name() {
                        continue;
                    }
                    if let Some(output) = producer.output_slot(&input.name) {
                        edges.push(Edge {
                            from: producer.name().to_string(),
                            to: consumer.name().to_string(),
                            value: input.name.clone(),
                            ordering: input.ordering || output.ordering,
                        });
                    }
                }
            }
        }

        // Pass 5: advisory type check, construction-time only.
        if self.strict_types {
            for edge in &edges {
                let producer = &nodes[index[&edge.from]];
                let consumer = &nodes[index[&edge.to]];
                let produced = producer.output_slot(&edge.value).and_then(|s| s.kind);
                let expected = consumer.input_slot(&edge.value).and_then(|s| s.kind);
                if let (Some(produced), Some(expected)) = (produced, expected) {
                    if produced != expected {
                        return Err(ConstructionError::TypeMismatch {
                            value: edge.value.clone(),
                            producer: edge.from.clone(),
                            produced,
                            consumer: edge.to.clone(),
                            expected,
                        }
                        .into());
                    }
                }
            }
        }

        // Pass 6: seed detection. A value sits on a cycle when its consumer
        // can reach one of its producers. Of those, the seeds are the
        // loop-carried inputs the cycle cannot bootstrap without: relax the
        // graph from its external inputs, and whenever nothing can start,
        // seed the first blocked node's cycle inputs (declaration order
        // makes this deterministic).
        let mut reach: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..nodes.len() {
            reach.add_node(i);
        }
        for edge in &edges {
            reach.add_edge(index[&edge.from], index[&edge.to], ());
        }
        let mut on_cycle: BTreeSet<&str> = BTreeSet::new();
        for edge in &edges {
            if has_path_connecting(&reach, index[&edge.to], index[&edge.from], None) {
                on_cycle.insert(edge.value.as_str());
            }
        }
        let cycle_values = seed_values(&nodes, &edges, &on_cycle);

        let bound = crate::value::ValueMap::new();
        let spec = InputSpec::classify(&nodes, &edges, &bound, &cycle_values);
        let name = self.name.unwrap_or_else(|| DEFAULT_GRAPH_NAME.to_string());
        debug!(
            graph = %name,
            nodes = nodes.len(),
            edges = edges.len(),
            seeds = cycle_values.len(),
            "graph built"
        );

        Ok(Graph {
            name,
            nodes,
            index,
            edges,
            bound,
            cycle_values,
            spec,
            strict_types: self.strict_types,
        })
    }
}

/// Which cycle values need an initial write before the first iteration.
///
/// Starts from the externally available values (consumed names nobody
/// produces) and repeatedly marks nodes startable. When the relaxation
/// stalls, the first blocked node's unavailable cycle inputs become seeds
/// and are treated as available from then on.
fn seed_values(
    nodes: &[Arc<Node>],
    edges: &[Edge],
    on_cycle: &BTreeSet<&str>,
) -> BTreeSet<String> {
    let produced: BTreeSet<&str> = edges.iter().map(|edge| edge.value.as_str()).collect();
    let mut available: BTreeSet<String> = nodes
        .iter()
        .flat_map(|node| node.inputs())
        .filter(|slot| !produced.contains(slot.name.as_str()))
        .map(|slot| slot.name.clone())
        .collect();
    let mut startable: BTreeSet<&str> = BTreeSet::new();
    let mut seeds: BTreeSet<String> = BTreeSet::new();

    loop {
        let mut progressed = false;
        for node in nodes {
            if startable.contains(node.name()) {
                continue;
            }
            let ready = node.inputs().iter().all(|slot| {
                slot.is_satisfied_by_default() || available.contains(&slot.name)
            });
            if ready {
                startable.insert(node.name());
                for slot in node.outputs() {
                    available.insert(slot.name.clone());
                }
                progressed = true;
            }
        }
        if progressed {
            continue;
        }
        // Stalled: seed the first blocked node's loop-carried inputs.
        let blocked = nodes.iter().find(|node| {
            !startable.contains(node.name())
                && node.inputs().iter().any(|slot| {
                    on_cycle.contains(slot.name.as_str()) && !available.contains(&slot.name)
                })
        });
        match blocked {
            Some(node) => {
                for slot in node.inputs() {
                    if on_cycle.contains(slot.name.as_str()) && !available.contains(&slot.name) {
                        seeds.insert(slot.name.clone());
                        available.insert(slot.name.clone());
                    }
                }
            }
            None => break,
        }
    }
    seeds
}

/// True if `a` and `b` are alternative targets of one common gate, and thus
/// can never both execute in the same run.
fn mutually_exclusive(nodes: &[Arc<Node>], a: &str, b: &str) -> bool {
    nodes.iter().any(|node| match node.kind() {
        NodeKind::Gate(gate) => {
            gate.targets().iter().any(|t| t == a) && gate.targets().iter().any(|t| t == b)
        }
        _ => false,
    })
}
