// Copyright 2026 Wireflow contributors

//! Routing gates: conditional dispatch without data outputs.
//!
//! A gate reads its inputs, picks one declared target (a node name or
//! [`crate::graph::END`]) and writes nothing to the value store. Three
//! dispatch strategies exist:
//!
//! - [`Node::gate`]: a decision function returning `Option<String>`, with an
//!   optional declared default for the `None` case;
//! - [`Node::branch`]: a boolean function picking between two targets;
//! - [`Node::type_switch`]: the runtime [`ValueKind`] of one named input is
//!   looked up in a kind-to-target table.
//!
//! Gates are synchronous by design rule - routing must be cheap - and are
//! the sole termination mechanism for cyclic graphs: a cycle ends when some
//! gate selects `END`.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{Value, ValueKind, ValueMap};

use super::{InputSlot, Node, NodeKind};

pub(crate) type DecideFn = Arc<dyn Fn(&ValueMap) -> Result<Option<String>> + Send + Sync>;
pub(crate) type BranchFn = Arc<dyn Fn(&ValueMap) -> Result<bool> + Send + Sync>;

/// Dispatch strategy of a gate.
#[derive(Clone)]
pub enum GateKind {
    /// Decision function matched against the declared target list.
    Decide {
        /// The decision function; `None` falls back to `default`.
        func: DecideFn,
        /// Fallback target when the function returns no decision.
        default: Option<String>,
    },
    /// Boolean function picking between two targets.
    Branch {
        /// The predicate.
        func: BranchFn,
        /// Target when the predicate is true.
        when_true: String,
        /// Target when the predicate is false.
        when_false: String,
    },
    /// Runtime-kind lookup on one named input.
    TypeSwitch {
        /// The input whose runtime kind is inspected.
        input: String,
        /// Kind-to-target table, consulted in order.
        table: Vec<(ValueKind, String)>,
        /// Fallback target when no table entry matches.
        default: Option<String>,
    },
}

/// A routing gate node.
#[derive(Clone)]
pub struct GateNode {
    pub(crate) targets: Vec<String>,
    pub(crate) kind: GateKind,
}

impl GateNode {
    /// Declared routing targets, in declaration order.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub(crate) fn declared_list(&self) -> String {
        self.targets.join(", ")
    }

    /// Run the gate's dispatch strategy against resolved inputs, returning
    /// the selected target.
    ///
    /// # Errors
    ///
    /// [`Error::UndeclaredTarget`] if the strategy yields a target outside
    /// the declared list; [`Error::NoRouteDecision`] if a decision gate
    /// returns `None` without a declared default.
    pub(crate) fn dispatch(&self, gate: &str, inputs: &ValueMap) -> Result<String> {
        let selected = match &self.kind {
            GateKind::Decide { func, default } => match func(inputs)? {
                Some(target) => target,
                None => default.clone().ok_or_else(|| Error::NoRouteDecision {
                    gate: gate.to_string(),
                })?,
            },
            GateKind::Branch {
                func,
                when_true,
                when_false,
            } => {
                if func(inputs)? {
                    when_true.clone()
                } else {
                    when_false.clone()
                }
            }
            GateKind::TypeSwitch {
                input,
                table,
                default,
            } => {
                let kind = ValueKind::of(inputs.get(input).unwrap_or(&Value::Null));
                match table.iter().find(|(k, _)| *k == kind) {
                    Some((_, target)) => target.clone(),
                    None => default.clone().ok_or_else(|| Error::NoRouteDecision {
                        gate: gate.to_string(),
                    })?,
                }
            }
        };

        if self.targets.iter().any(|t| t == &selected) {
            Ok(selected)
        } else {
            Err(Error::UndeclaredTarget {
                gate: gate.to_string(),
                target: selected,
                declared: self.declared_list(),
            })
        }
    }
}

impl Node {
    /// Decision-function gate.
    ///
    /// The function returns the name of the target to run next (or
    /// [`crate::graph::END`] to finish), or `None` to fall back to the
    /// default declared via [`Node::with_default_target`].
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use wireflow::{Node, END};
    ///
    /// let is_funny = Node::gate("is_funny", ["verdict"], [END, "generate"], |args| {
    ///     Ok(Some(if args["verdict"] == "funny" {
    ///         END.to_string()
    ///     } else {
    ///         "generate".to_string()
    ///     }))
    /// });
    /// ```
    pub fn gate<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        targets: impl IntoIterator<Item = impl Into<String>>,
        f: F,
    ) -> Self
    where
        F: Fn(&ValueMap) -> Result<Option<String>> + Send + Sync + 'static,
    {
        let inputs = inputs.into_iter().map(InputSlot::data).collect();
        Self::with_kind(
            name,
            inputs,
            Vec::new(),
            NodeKind::Gate(GateNode {
                targets: targets.into_iter().map(Into::into).collect(),
                kind: GateKind::Decide {
                    func: Arc::new(f),
                    default: None,
                },
            }),
        )
    }

    /// Boolean gate between two targets.
    pub fn branch<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        when_true: impl Into<String>,
        when_false: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&ValueMap) -> Result<bool> + Send + Sync + 'static,
    {
        let when_true = when_true.into();
        let when_false = when_false.into();
        let inputs = inputs.into_iter().map(InputSlot::data).collect();
        Self::with_kind(
            name,
            inputs,
            Vec::new(),
            NodeKind::Gate(GateNode {
                targets: vec![when_true.clone(), when_false.clone()],
                kind: GateKind::Branch {
                    func: Arc::new(f),
                    when_true,
                    when_false,
                },
            }),
        )
    }

    /// Type-dispatch gate: routes on the runtime kind of `input`.
    pub fn type_switch(
        name: impl Into<String>,
        input: impl Into<String>,
        table: impl IntoIterator<Item = (ValueKind, impl Into<String>)>,
    ) -> Self {
        let input = input.into();
        let table: Vec<(ValueKind, String)> = table
            .into_iter()
            .map(|(kind, target)| (kind, target.into()))
            .collect();
        let targets = table.iter().map(|(_, target)| target.clone()).collect();
        Self::with_kind(
            name,
            vec![InputSlot::data(input.clone())],
            Vec::new(),
            NodeKind::Gate(GateNode {
                targets,
                kind: GateKind::TypeSwitch {
                    input,
                    table,
                    default: None,
                },
            }),
        )
    }

    /// Declare the fallback target used when a decision gate returns `None`
    /// or a type-switch finds no table entry. The target is added to the
    /// declared list if not already present.
    #[must_use]
    pub fn with_default_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        if let NodeKind::Gate(gate) = &mut self.kind {
            if !gate.targets.iter().any(|t| t == &target) {
                gate.targets.push(target.clone());
            }
            match &mut gate.kind {
                GateKind::Decide { default, .. } | GateKind::TypeSwitch { default, .. } => {
                    *default = Some(target);
                }
                GateKind::Branch { .. } => {
                    debug_assert!(false, "with_default_target: branch gates have no default");
                }
            }
        } else {
            debug_assert!(false, "with_default_target: '{}' is not a gate", self.name);
        }
        self
    }
}
