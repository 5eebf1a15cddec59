// Copyright 2026 Wireflow contributors

//! Input classification.
//!
//! A built graph partitions its externally visible inputs by how they get a
//! value:
//!
//! - **bound**: an override value is attached to the graph itself;
//! - **optional**: bound, or some consuming slot declares a default;
//! - **required**: neither - the caller must supply it at run time;
//! - **seeds**: values that participate in a cycle and therefore need an
//!   initial value before the first iteration. Seeds overlap the other
//!   sets: a bound seed is listed in both `bound` and `seeds`.
//!
//! Priority for the disjoint buckets is bound > default > neither. The spec
//! is recomputed whenever bindings change - `bind`/`unbind` return a new
//! [`crate::graph::Graph`] carrying a fresh `InputSpec`; the original is
//! untouched.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::node::Node;
use crate::value::ValueMap;

use super::edge::Edge;

/// Classification of a graph's inputs. See the module docs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSpec {
    /// Inputs the caller must supply at run time.
    pub required: BTreeSet<String>,
    /// Inputs satisfied without the caller: bound or defaulted.
    pub optional: BTreeSet<String>,
    /// Inputs with an explicit override attached to the graph.
    pub bound: BTreeSet<String>,
    /// Cycle-participating inputs needing an initial value.
    pub seeds: BTreeSet<String>,
}

impl InputSpec {
    /// Every externally visible input name, in sorted order.
    #[must_use]
    pub fn all(&self) -> BTreeSet<&str> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .chain(self.seeds.iter())
            .map(String::as_str)
            .collect()
    }

    /// True if `name` is one of this graph's inputs.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.required.contains(name) || self.optional.contains(name) || self.seeds.contains(name)
    }

    /// Classify a graph's inputs.
    ///
    /// An input is a consumed name with no producer, or a cycle value
    /// (which has a producer but still needs its first-iteration value from
    /// outside).
    pub(crate) fn classify(
        nodes: &[Arc<Node>],
        edges: &[Edge],
        bound: &ValueMap,
        cycle_values: &BTreeSet<String>,
    ) -> Self {
        let produced: BTreeSet<&str> = edges.iter().map(|edge| edge.value.as_str()).collect();

        let mut spec = InputSpec::default();
        for node in nodes {
            for slot in node.inputs() {
                let name = slot.name.as_str();
                let is_seed = cycle_values.contains(name);
                if produced.contains(name) && !is_seed {
                    continue;
                }
                if is_seed {
                    spec.seeds.insert(name.to_string());
                }
                if bound.contains_key(name) {
                    spec.bound.insert(name.to_string());
                    spec.optional.insert(name.to_string());
                } else if slot.is_satisfied_by_default() {
                    spec.optional.insert(name.to_string());
                } else if !spec.optional.contains(name) {
                    spec.required.insert(name.to_string());
                }
            }
        }
        // A name may be consumed by several nodes; if any consumer defaults
        // it, the input is optional for the whole graph.
        spec.required = spec
            .required
            .difference(&spec.optional)
            .cloned()
            .collect();
        spec
    }
}
