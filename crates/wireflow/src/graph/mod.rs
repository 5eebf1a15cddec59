// Copyright 2026 Wireflow contributors

//! The graph: an immutable, validated node set with inferred edges.
//!
//! Graphs are built once and never mutated. Transformations - binding a
//! value, renaming, wrapping as a composite node - return a new `Graph`
//! (shallow copies; nodes sit behind `Arc`), so several composite nodes can
//! safely share one inner graph across concurrent runs.

pub mod build;
pub mod edge;
pub mod inputs;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{ConstructionError, Result};
use crate::node::{Node, NodeKind};
use crate::value::ValueMap;

pub use build::GraphBuilder;
pub use edge::{Edge, END};
pub use inputs::InputSpec;

/// A validated, immutable computation graph.
#[derive(Clone)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Arc<Node>>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) bound: ValueMap,
    pub(crate) cycle_values: BTreeSet<String>,
    pub(crate) spec: InputSpec,
    pub(crate) strict_types: bool,
}

impl Graph {
    /// Start building a graph.
    #[must_use]
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Build a graph from a node list with default settings.
    ///
    /// # Errors
    ///
    /// Any [`ConstructionError`]; validation is exhaustive and runs no node.
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        Self::builder().nodes(nodes).build()
    }

    /// Graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterate the nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().map(Arc::as_ref)
    }

    /// Look up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Arc<Node>> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// The inferred edge list.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Input classification for this graph (with current bindings applied).
    #[must_use]
    pub fn inputs(&self) -> &InputSpec {
        &self.spec
    }

    /// Values bound directly onto the graph.
    #[must_use]
    pub fn bound(&self) -> &ValueMap {
        &self.bound
    }

    /// Attach override values, returning a new graph. Bound values satisfy
    /// inputs without the caller passing them; the original graph is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`ConstructionError::UnknownBinding`] if a name is not one of this
    /// graph's inputs.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let seeded = graph.bind([("feedback".to_string(), Value::Null)].into())?;
    /// assert!(seeded.inputs().bound.contains("feedback"));
    /// ```
    pub fn bind(&self, values: ValueMap) -> Result<Self> {
        for name in values.keys() {
            if !self.spec.contains(name) {
                return Err(ConstructionError::UnknownBinding {
                    name: name.clone(),
                    graph: self.name.clone(),
                }
                .into());
            }
        }
        let mut next = self.clone();
        next.bound.extend(values);
        next.reclassify();
        Ok(next)
    }

    /// Remove bindings, returning a new graph. Unbinding a known input that
    /// is not currently bound is a no-op.
    ///
    /// # Errors
    ///
    /// [`ConstructionError::UnknownBinding`] if a name is not one of this
    /// graph's inputs.
    pub fn unbind(&self, names: &[&str]) -> Result<Self> {
        let mut next = self.clone();
        for name in names {
            if !self.spec.contains(name) && !self.bound.contains_key(*name) {
                return Err(ConstructionError::UnknownBinding {
                    name: (*name).to_string(),
                    graph: self.name.clone(),
                }
                .into());
            }
            next.bound.remove(*name);
        }
        next.reclassify();
        Ok(next)
    }

    /// Rename, returning a new graph.
    #[must_use]
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.name = name.into();
        next
    }

    /// Wrap this graph as a composite node for use inside another graph.
    ///
    /// The node's inputs are this graph's unbound inputs; its outputs are
    /// the leaf outputs (outputs no node here consumes).
    #[must_use]
    pub fn as_node(&self, name: impl Into<String>) -> Node {
        Node::composite(name, Arc::new(self.clone()))
    }

    /// Data outputs with no consumer inside this graph, in declaration
    /// order.
    #[must_use]
    pub fn leaf_outputs(&self) -> Vec<String> {
        let consumed: BTreeSet<&str> = self
            .edges
            .iter()
            .filter(|edge| !edge.ordering)
            .map(|edge| edge.value.as_str())
            .collect();
        let mut seen = BTreeSet::new();
        let mut leaves = Vec::new();
        for node in self.nodes() {
            for name in node.output_names() {
                if !consumed.contains(name) && seen.insert(name.to_string()) {
                    leaves.push(name.to_string());
                }
            }
        }
        leaves
    }

    /// Names of nodes that appear in some gate's target list. Gated nodes
    /// only run when a routing decision selects them.
    #[must_use]
    pub(crate) fn gated_nodes(&self) -> BTreeSet<String> {
        let mut gated = BTreeSet::new();
        for node in self.nodes() {
            if let NodeKind::Gate(gate) = node.kind() {
                for target in gate.targets() {
                    if target != END {
                        gated.insert(target.clone());
                    }
                }
            }
        }
        gated
    }

    /// True if this graph (recursively through composites) contains an
    /// interrupt node.
    #[must_use]
    pub fn has_interrupts(&self) -> bool {
        self.nodes().any(|node| match node.kind() {
            NodeKind::Interrupt(_) => true,
            NodeKind::Composite(inner) => inner.graph().has_interrupts(),
            _ => false,
        })
    }

    /// True if this graph (recursively through composites) contains a
    /// suspend-capable computation node.
    #[must_use]
    pub fn has_async_nodes(&self) -> bool {
        self.nodes().any(|node| match node.kind() {
            NodeKind::Function(func) => func.is_async(),
            NodeKind::Composite(inner) => inner.graph().has_async_nodes(),
            _ => false,
        })
    }

    fn reclassify(&mut self) {
        self.spec = InputSpec::classify(&self.nodes, &self.edges, &self.bound, &self.cycle_values);
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("bound", &self.bound.keys().collect::<Vec<_>>())
            .field("strict_types", &self.strict_types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::value::ValueKind;
    use serde_json::json;

    fn out(name: &str, value: crate::value::Value) -> ValueMap {
        [(name.to_string(), value)].into()
    }

    fn double() -> Node {
        Node::function("double", ["x"], ["y"], |args| {
            Ok(out("y", json!(args["x"].as_i64().unwrap_or(0) * 2)))
        })
    }

    fn add_ten() -> Node {
        Node::function("add_ten", ["y"], ["z"], |args| {
            Ok(out("z", json!(args["y"].as_i64().unwrap_or(0) + 10)))
        })
    }

    #[test]
    fn wires_edges_by_name_matching() {
        let graph = Graph::new(vec![double(), add_ten()]).unwrap();
        assert_eq!(graph.edges().len(), 1);
        let edge = &graph.edges()[0];
        assert_eq!((edge.from.as_str(), edge.to.as_str()), ("double", "add_ten"));
        assert_eq!(edge.value, "y");
        assert!(!edge.ordering);

        let spec = graph.inputs();
        assert!(spec.required.contains("x"));
        assert!(spec.optional.is_empty());
        assert_eq!(graph.leaf_outputs(), vec!["z".to_string()]);
    }

    #[test]
    fn rejects_duplicate_node_names() {
        let err = Graph::new(vec![double(), double()]).unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::DuplicateNode { .. })
        ));
    }

    #[test]
    fn rejects_empty_graph() {
        let err = Graph::new(Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::EmptyGraph)
        ));
    }

    #[test]
    fn rejects_gate_with_unknown_target_without_running_anything() {
        let gate = Node::gate("route", ["y"], ["double", "missing"], |_| {
            panic!("gate function must never run at build time")
        });
        let err = Graph::new(vec![double(), gate]).unwrap_err();
        match err {
            Error::Construction(ConstructionError::UnknownGateTarget { gate, target }) => {
                assert_eq!(gate, "route");
                assert_eq!(target, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_gate_targeting_itself() {
        let gate = Node::gate("route", ["y"], ["route"], |_| Ok(None));
        let err = Graph::new(vec![double(), gate]).unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::GateTargetsSelf { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_outputs_without_common_gate() {
        let also_y = Node::function("also", ["x"], ["y"], |args| Ok(out("y", args["x"].clone())));
        let err = Graph::new(vec![double(), also_y]).unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::DuplicateOutput { .. })
        ));
    }

    #[test]
    fn allows_duplicate_outputs_across_branches_of_one_gate() {
        let pick = Node::branch("pick", ["x"], "double", "halve", |args| {
            Ok(args["x"].as_i64().unwrap_or(0) > 0)
        });
        let halve = Node::function("halve", ["x"], ["y"], |args| {
            Ok(out("y", json!(args["x"].as_i64().unwrap_or(0) / 2)))
        });
        assert!(Graph::new(vec![pick, double(), halve]).is_ok());
    }

    #[test]
    fn rejects_cache_on_composite() {
        let inner = Graph::new(vec![double()]).unwrap();
        let composite = inner.as_node("wrapped").with_cache();
        let err = Graph::new(vec![composite, add_ten()]).unwrap_err();
        match err {
            Error::Construction(ConstructionError::CacheUnsupported { node, kind }) => {
                assert_eq!(node, "wrapped");
                assert_eq!(kind, "composite");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_map_over_on_non_composite() {
        let bad = double().map_over(["x"], crate::node::MapMode::Zip);
        let err = Graph::new(vec![bad, add_ten()]).unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::InvalidMapOver { .. })
        ));
    }

    #[test]
    fn strict_types_rejects_mismatched_edge() {
        let producer = double().with_output_kind("y", ValueKind::Number);
        let consumer = add_ten().with_input_kind("y", ValueKind::String);
        let err = Graph::builder()
            .strict_types(true)
            .nodes(vec![producer, consumer])
            .build()
            .unwrap_err();
        match err {
            Error::Construction(ConstructionError::TypeMismatch { value, .. }) => {
                assert_eq!(value, "y");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn strict_types_accepts_matching_or_undeclared_kinds() {
        let producer = double().with_output_kind("y", ValueKind::Number);
        let consumer = add_ten().with_input_kind("y", ValueKind::Number);
        assert!(Graph::builder()
            .strict_types(true)
            .nodes(vec![producer, consumer])
            .build()
            .is_ok());
        // Undeclared kinds are not checked.
        assert!(Graph::builder()
            .strict_types(true)
            .nodes(vec![double(), add_ten()])
            .build()
            .is_ok());
    }

    #[test]
    fn bind_moves_input_out_of_required_immutably() {
        let graph = Graph::new(vec![double(), add_ten()]).unwrap();
        let bound = graph.bind([("x".to_string(), json!(5))].into()).unwrap();

        assert!(bound.inputs().bound.contains("x"));
        assert!(bound.inputs().optional.contains("x"));
        assert!(!bound.inputs().required.contains("x"));
        // The original classification is untouched.
        assert!(graph.inputs().required.contains("x"));
        assert!(graph.inputs().bound.is_empty());
    }

    #[test]
    fn unbind_restores_required_and_rejects_unknown_names() {
        let graph = Graph::new(vec![double(), add_ten()]).unwrap();
        let bound = graph.bind([("x".to_string(), json!(5))].into()).unwrap();
        let unbound = bound.unbind(&["x"]).unwrap();
        assert!(unbound.inputs().required.contains("x"));

        assert!(matches!(
            graph.bind([("nope".to_string(), json!(1))].into()),
            Err(Error::Construction(ConstructionError::UnknownBinding { .. }))
        ));
        assert!(matches!(
            graph.unbind(&["nope"]),
            Err(Error::Construction(ConstructionError::UnknownBinding { .. }))
        ));
    }

    #[test]
    fn cycle_values_are_classified_as_seeds() {
        // generate(topic, feedback) -> joke; evaluate(joke) -> verdict, feedback
        let generate = Node::function("generate", ["topic", "feedback"], ["joke"], |_| {
            Ok(out("joke", json!("?")))
        });
        let evaluate = Node::function("evaluate", ["joke"], ["verdict", "feedback"], |_| {
            let mut m = out("verdict", json!("funny"));
            m.insert("feedback".to_string(), json!(""));
            Ok(m)
        });
        let graph = Graph::new(vec![generate, evaluate]).unwrap();

        let spec = graph.inputs();
        assert!(spec.seeds.contains("feedback"));
        assert!(spec.required.contains("feedback"));
        assert!(spec.required.contains("topic"));
        assert!(!spec.seeds.contains("topic"));

        // Binding the seed keeps it a seed but satisfies it.
        let seeded = graph.bind([("feedback".to_string(), json!(null))].into()).unwrap();
        assert!(seeded.inputs().seeds.contains("feedback"));
        assert!(!seeded.inputs().required.contains("feedback"));
    }

    #[test]
    fn ordering_tokens_form_edges_and_are_not_leaf_outputs() {
        let first = double().emits("done");
        let second = add_ten().wait_for("done");
        let graph = Graph::new(vec![first, second]).unwrap();
        let ordering: Vec<_> = graph.edges().iter().filter(|e| e.ordering).collect();
        assert_eq!(ordering.len(), 1);
        assert_eq!(ordering[0].value, "done");
        assert!(!graph.leaf_outputs().contains(&"done".to_string()));
    }

    #[test]
    fn with_name_is_immutable() {
        let graph = Graph::new(vec![double()]).unwrap().with_name("pipeline");
        assert_eq!(graph.name(), "pipeline");
        assert_eq!(graph.with_name("other").name(), "other");
        assert_eq!(graph.name(), "pipeline");
    }
}
