// Copyright 2026 Wireflow contributors

//! Composite nodes: an entire inner graph behaving as one node.
//!
//! A composite's inputs are the inner graph's inputs (minus bound values)
//! and its outputs are the inner graph's leaf outputs - outputs no inner
//! node consumes. Execution runs the inner graph through the same engine,
//! re-entrantly, under the outer run's concurrency budget.
//!
//! A composite may declare a fan-out via [`Node::map_over`]: the inner graph
//! runs once per combination of the iterated inputs (zipped pairwise or as a
//! cross product) and each leaf output is collected into an ordered array.
//!
//! Composites carry no cache flag of their own - enable caching on the inner
//! nodes instead; the graph builder rejects `with_cache` on a composite.

use std::sync::Arc;

use crate::graph::Graph;

use super::{InputSlot, Node, NodeKind, OutputSlot};

/// How multiple mapped inputs combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Pairwise: element i of every mapped input forms iteration i. All
    /// mapped inputs must have equal lengths.
    Zip,
    /// Cross product: one iteration per combination of elements.
    Product,
}

/// Fan-out declaration on a composite node (or a batch map call).
#[derive(Debug, Clone)]
pub struct MapSpec {
    /// Inputs to iterate over; their values must be arrays.
    pub names: Vec<String>,
    /// Combination mode across several mapped inputs.
    pub mode: MapMode,
}

/// A node wrapping an entire inner graph.
#[derive(Clone)]
pub struct CompositeNode {
    pub(crate) graph: Arc<Graph>,
}

impl CompositeNode {
    /// The wrapped inner graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

impl Node {
    /// Wrap a graph as a single node. Prefer [`Graph::as_node`].
    pub(crate) fn composite(name: impl Into<String>, graph: Arc<Graph>) -> Self {
        let spec = graph.inputs();
        let mut inputs: Vec<InputSlot> = Vec::new();
        for input in spec.all() {
            if spec.bound.contains(input) {
                continue;
            }
            let mut slot = InputSlot::data(input);
            slot.optional = spec.optional.contains(input);
            inputs.push(slot);
        }
        let outputs = graph
            .leaf_outputs()
            .into_iter()
            .map(OutputSlot::data)
            .collect();
        Self::with_kind(name, inputs, outputs, NodeKind::Composite(CompositeNode { graph }))
    }

    /// Declare a fan-out over one or more of this composite's inputs.
    ///
    /// Validated at graph build time: the node must be a composite and every
    /// name must be one of its declared inputs.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use wireflow::MapMode;
    ///
    /// let per_topic = inner.as_node("per_topic").map_over(["topic"], MapMode::Zip);
    /// ```
    #[must_use]
    pub fn map_over(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
        mode: MapMode,
    ) -> Self {
        self.map_spec = Some(MapSpec {
            names: names.into_iter().map(Into::into).collect(),
            mode,
        });
        self
    }

    /// The declared fan-out, if any.
    #[must_use]
    pub fn map_spec(&self) -> Option<&MapSpec> {
        self.map_spec.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueMap;
    use serde_json::json;

    fn inner_graph() -> Graph {
        let double = Node::function("double", ["x"], ["y"], |args| {
            let x = args["x"].as_i64().unwrap_or(0);
            let mut out = ValueMap::new();
            out.insert("y".to_string(), json!(x * 2));
            Ok(out)
        });
        let add_ten = Node::function("add_ten", ["y"], ["z"], |args| {
            let y = args["y"].as_i64().unwrap_or(0);
            let mut out = ValueMap::new();
            out.insert("z".to_string(), json!(y + 10));
            Ok(out)
        });
        Graph::new(vec![double, add_ten]).unwrap()
    }

    #[test]
    fn composite_exposes_inner_inputs_and_leaf_outputs() {
        let node = inner_graph().as_node("pipeline");
        assert_eq!(node.input_names().collect::<Vec<_>>(), vec!["x"]);
        // `y` is consumed by add_ten, so only `z` is a leaf output.
        assert_eq!(node.output_names().collect::<Vec<_>>(), vec!["z"]);
        assert_eq!(node.kind_name(), "composite");
    }

    #[test]
    fn bound_inner_inputs_disappear_from_composite_surface() {
        let graph = inner_graph().bind([("x".to_string(), json!(4))].into()).unwrap();
        let node = graph.as_node("pipeline");
        assert_eq!(node.input_names().count(), 0);
    }

    #[test]
    fn map_over_records_spec() {
        let node = inner_graph().as_node("pipeline").map_over(["x"], MapMode::Product);
        let spec = node.map_spec().unwrap();
        assert_eq!(spec.names, vec!["x".to_string()]);
        assert_eq!(spec.mode, MapMode::Product);
    }
}
