// Copyright 2026 Wireflow contributors

//! The node model: a closed set of polymorphic node kinds.
//!
//! Every node shares one identity contract - a name, ordered input slots and
//! ordered output slots - and carries exactly one [`NodeKind`]:
//!
//! - [`NodeKind::Function`]: wraps a plain function (sync, async or
//!   generator); the workhorse of every graph.
//! - [`NodeKind::Gate`]: routing decisions; produces no data, selects the
//!   next node or [`crate::graph::END`].
//! - [`NodeKind::Interrupt`]: human-in-the-loop pause point.
//! - [`NodeKind::Composite`]: a whole inner graph behaving as one node.
//!
//! The scheduler dispatches on the kind with a single `match` - there is no
//! open-ended node trait to implement. Wiring is by name: an output called
//! `"y"` feeds every other node with an input called `"y"`.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use wireflow::{Graph, Node};
//!
//! let double = Node::function("double", ["x"], ["y"], |args| {
//!     let x = args["x"].as_i64().unwrap_or(0);
//!     Ok([("y".to_string(), json!(x * 2))].into())
//! });
//! let add_ten = Node::function("add_ten", ["y"], ["z"], |args| {
//!     let y = args["y"].as_i64().unwrap_or(0);
//!     Ok([("z".to_string(), json!(y + 10))].into())
//! });
//! let graph = Graph::new(vec![double, add_ten])?;
//! ```

pub mod composite;
pub mod gate;
pub mod interrupt;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::value::{content_hash, Value, ValueKind, ValueMap};

pub use composite::{CompositeNode, MapMode, MapSpec};
pub use gate::{GateKind, GateNode};
pub use interrupt::{interrupt_response_key, InterruptNode};

/// Boxed future returned by async node functions.
pub type NodeFuture = BoxFuture<'static, Result<ValueMap>>;

/// Boxed future returned by generator node functions: the full ordered
/// sequence of yielded output maps.
pub type GeneratorFuture = BoxFuture<'static, Result<Vec<ValueMap>>>;

pub(crate) type SyncFn = Arc<dyn Fn(&ValueMap) -> Result<ValueMap> + Send + Sync>;
pub(crate) type AsyncFn = Arc<dyn Fn(ValueMap) -> NodeFuture + Send + Sync>;
pub(crate) type GeneratorFn = Arc<dyn Fn(ValueMap) -> GeneratorFuture + Send + Sync>;

/// One declared input of a node.
#[derive(Clone)]
pub struct InputSlot {
    /// Value name this slot consumes.
    pub name: String,
    /// Default used when no value is present in the store.
    pub default: Option<Value>,
    /// Declared kind, checked per edge under strict types.
    pub kind: Option<ValueKind>,
    /// Optional without a concrete default; simply omitted when absent.
    pub optional: bool,
    /// Ordering-only slot: sequences execution, carries no data.
    pub ordering: bool,
}

impl InputSlot {
    pub(crate) fn data(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            kind: None,
            optional: false,
            ordering: false,
        }
    }

    /// True if execution can proceed without this value being present.
    #[must_use]
    pub fn is_satisfied_by_default(&self) -> bool {
        self.optional || self.default.is_some()
    }
}

/// One declared output of a node.
#[derive(Clone)]
pub struct OutputSlot {
    /// Value name this slot produces.
    pub name: String,
    /// Declared kind, checked per edge under strict types.
    pub kind: Option<ValueKind>,
    /// Ordering-only token written as null on completion.
    pub ordering: bool,
}

impl OutputSlot {
    pub(crate) fn data(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            ordering: false,
        }
    }
}

/// Body of a function node.
#[derive(Clone)]
pub(crate) enum FnBody {
    /// Plain synchronous function; eligible for `run_sync`.
    Sync(SyncFn),
    /// Asynchronous function; may suspend without blocking other tasks.
    Async(AsyncFn),
    /// Generator: yields an ordered sequence of output maps.
    Generator(GeneratorFn),
}

/// A computation node wrapping a user function.
#[derive(Clone)]
pub struct FunctionNode {
    pub(crate) body: FnBody,
}

impl FunctionNode {
    /// True if the body performs asynchronous work (async or generator).
    #[must_use]
    pub fn is_async(&self) -> bool {
        !matches!(self.body, FnBody::Sync(_))
    }

    /// True if the body yields multiple results.
    #[must_use]
    pub fn is_generator(&self) -> bool {
        matches!(self.body, FnBody::Generator(_))
    }
}

/// Closed set of node kinds. The scheduler pattern-matches on this.
#[derive(Clone)]
pub enum NodeKind {
    /// Computation wrapping a plain function.
    Function(FunctionNode),
    /// Routing gate; see [`GateNode`].
    Gate(GateNode),
    /// Human-in-the-loop pause point; see [`InterruptNode`].
    Interrupt(InterruptNode),
    /// Nested inner graph; see [`CompositeNode`].
    Composite(CompositeNode),
}

/// A unit of the graph: shared identity plus one [`NodeKind`].
#[derive(Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) outputs: Vec<OutputSlot>,
    pub(crate) kind: NodeKind,
    pub(crate) cache: bool,
    pub(crate) fingerprint_tag: Option<String>,
    pub(crate) map_spec: Option<MapSpec>,
}

impl Node {
    pub(crate) fn with_kind(
        name: impl Into<String>,
        inputs: Vec<InputSlot>,
        outputs: Vec<OutputSlot>,
        kind: NodeKind,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            kind,
            cache: false,
            fingerprint_tag: None,
            map_spec: None,
        }
    }

    fn data_slots(
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> (Vec<InputSlot>, Vec<OutputSlot>) {
        (
            inputs.into_iter().map(InputSlot::data).collect(),
            outputs.into_iter().map(OutputSlot::data).collect(),
        )
    }

    /// Synchronous computation node.
    ///
    /// The function receives the resolved input values by name and returns
    /// a map containing every declared output.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let double = Node::function("double", ["x"], ["y"], |args| {
    ///     let x = args["x"].as_i64().unwrap_or(0);
    ///     Ok([("y".to_string(), json!(x * 2))].into())
    /// });
    /// ```
    pub fn function<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
        f: F,
    ) -> Self
    where
        F: Fn(&ValueMap) -> Result<ValueMap> + Send + Sync + 'static,
    {
        let (inputs, outputs) = Self::data_slots(inputs, outputs);
        Self::with_kind(
            name,
            inputs,
            outputs,
            NodeKind::Function(FunctionNode {
                body: FnBody::Sync(Arc::new(f)),
            }),
        )
    }

    /// Asynchronous computation node. The function returns a boxed future;
    /// the engine will not assume synchronous completion.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let fetch = Node::async_function("fetch", ["url"], ["body"], |args| {
    ///     Box::pin(async move {
    ///         let body = http_get(&args["url"]).await?;
    ///         Ok([("body".to_string(), body)].into())
    ///     })
    /// });
    /// ```
    pub fn async_function<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
        f: F,
    ) -> Self
    where
        F: Fn(ValueMap) -> NodeFuture + Send + Sync + 'static,
    {
        let (inputs, outputs) = Self::data_slots(inputs, outputs);
        Self::with_kind(
            name,
            inputs,
            outputs,
            NodeKind::Function(FunctionNode {
                body: FnBody::Async(Arc::new(f)),
            }),
        )
    }

    /// Generator node: yields an ordered sequence of output maps. Each yield
    /// is written to the value store in order, advancing versions per yield.
    pub fn generator<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
        f: F,
    ) -> Self
    where
        F: Fn(ValueMap) -> GeneratorFuture + Send + Sync + 'static,
    {
        let (inputs, outputs) = Self::data_slots(inputs, outputs);
        Self::with_kind(
            name,
            inputs,
            outputs,
            NodeKind::Function(FunctionNode {
                body: FnBody::Generator(Arc::new(f)),
            }),
        )
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's kind.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Human-readable kind name, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Function(_) => "function",
            NodeKind::Gate(_) => "gate",
            NodeKind::Interrupt(_) => "interrupt",
            NodeKind::Composite(_) => "composite",
        }
    }

    /// Declared input slots, in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    /// Declared output slots, in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    /// Names of data (non-ordering) inputs.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter(|slot| !slot.ordering)
            .map(|slot| slot.name.as_str())
    }

    /// Names of data (non-ordering) outputs.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .iter()
            .filter(|slot| !slot.ordering)
            .map(|slot| slot.name.as_str())
    }

    /// True if result caching is enabled for this node.
    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache
    }

    /// True if executing this node may suspend (async or generator body).
    /// Composite nodes report true if any inner node does.
    #[must_use]
    pub fn suspend_capable(&self) -> bool {
        match &self.kind {
            NodeKind::Function(func) => func.is_async(),
            NodeKind::Gate(_) => false,
            NodeKind::Interrupt(_) => false,
            NodeKind::Composite(inner) => inner
                .graph
                .nodes()
                .any(|node| node.suspend_capable() || matches!(node.kind, NodeKind::Interrupt(_))),
        }
    }

    /// Attach a default value to a declared input, making it optional.
    ///
    /// The input must already be declared; defaults on undeclared names are
    /// a programming error.
    #[must_use]
    pub fn with_default(mut self, input: &str, value: Value) -> Self {
        let mut found = false;
        for slot in &mut self.inputs {
            if slot.name == input {
                slot.default = Some(value.clone());
                found = true;
            }
        }
        debug_assert!(found, "with_default: input '{input}' is not declared");
        self
    }

    /// Enable result caching. Only valid on function nodes; the graph
    /// builder rejects the flag on any other kind.
    #[must_use]
    pub fn with_cache(mut self) -> Self {
        self.cache = true;
        self
    }

    /// Override the version tag folded into the definition fingerprint.
    ///
    /// Closures cannot be hashed, so the fingerprint covers the node's name
    /// and shape plus this tag. Bump the tag when the node's logic changes
    /// to invalidate stale cache entries.
    #[must_use]
    pub fn with_fingerprint(mut self, tag: impl Into<String>) -> Self {
        self.fingerprint_tag = Some(tag.into());
        self
    }

    /// Declare the expected kind of an input, for strict-type builds.
    #[must_use]
    pub fn with_input_kind(mut self, input: &str, kind: ValueKind) -> Self {
        let mut found = false;
        for slot in &mut self.inputs {
            if slot.name == input {
                slot.kind = Some(kind);
                found = true;
            }
        }
        debug_assert!(found, "with_input_kind: input '{input}' is not declared");
        self
    }

    /// Declare the produced kind of an output, for strict-type builds.
    #[must_use]
    pub fn with_output_kind(mut self, output: &str, kind: ValueKind) -> Self {
        let mut found = false;
        for slot in &mut self.outputs {
            if slot.name == output {
                slot.kind = Some(kind);
                found = true;
            }
        }
        debug_assert!(found, "with_output_kind: output '{output}' is not declared");
        self
    }

    /// Declare an ordering-only token this node emits on completion.
    ///
    /// The token is written as null and carries no data; pair it with
    /// [`Node::wait_for`] on another node to sequence execution without a
    /// data dependency.
    #[must_use]
    pub fn emits(mut self, token: impl Into<String>) -> Self {
        self.outputs.push(OutputSlot {
            name: token.into(),
            kind: None,
            ordering: true,
        });
        self
    }

    /// Declare an ordering-only dependency: this node will not run until
    /// the token has been emitted.
    #[must_use]
    pub fn wait_for(mut self, token: impl Into<String>) -> Self {
        self.inputs.push(InputSlot {
            name: token.into(),
            default: None,
            kind: None,
            optional: false,
            ordering: true,
        });
        self
    }

    /// Definition fingerprint: a stable hash of the node's declared shape
    /// and version tag, used for cache keys.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<&[u8]> = vec![self.kind_name().as_bytes(), self.name.as_bytes()];
        for slot in &self.inputs {
            parts.push(slot.name.as_bytes());
        }
        for slot in &self.outputs {
            parts.push(slot.name.as_bytes());
        }
        if let Some(tag) = &self.fingerprint_tag {
            parts.push(tag.as_bytes());
        }
        content_hash(&parts)
    }

    pub(crate) fn input_slot(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|slot| slot.name == name)
    }

    pub(crate) fn output_slot(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|slot| slot.name == name)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind_name())
            .field(
                "inputs",
                &self.inputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "outputs",
                &self.outputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(name: &str) -> Node {
        Node::function(name, ["a"], ["b"], |args| {
            let mut out = ValueMap::new();
            out.insert("b".to_string(), args["a"].clone());
            Ok(out)
        })
    }

    #[test]
    fn function_node_identity() {
        let node = echo("echo");
        assert_eq!(node.name(), "echo");
        assert_eq!(node.input_names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(node.output_names().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(node.kind_name(), "function");
        assert!(!node.suspend_capable());
        assert!(!node.cache_enabled());
    }

    #[test]
    fn defaults_make_inputs_optional() {
        let node = echo("echo").with_default("a", json!(1));
        let slot = node.input_slot("a").unwrap();
        assert!(slot.is_satisfied_by_default());
        assert_eq!(slot.default, Some(json!(1)));
    }

    #[test]
    fn ordering_slots_are_excluded_from_data_names() {
        let node = echo("echo").emits("done").wait_for("go");
        assert_eq!(node.input_names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(node.output_names().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.outputs().len(), 2);
    }

    #[test]
    fn fingerprint_changes_with_tag_and_shape() {
        let base = echo("echo").fingerprint();
        assert_eq!(base, echo("echo").fingerprint());
        assert_ne!(base, echo("echo").with_fingerprint("v2").fingerprint());
        assert_ne!(base, echo("other").fingerprint());
    }

    #[test]
    fn async_function_is_suspend_capable() {
        let node = Node::async_function("sleepy", ["a"], ["b"], |args| {
            Box::pin(async move {
                let mut out = ValueMap::new();
                out.insert("b".to_string(), args.get("a").cloned().unwrap_or(Value::Null));
                Ok(out)
            })
        });
        assert!(node.suspend_capable());
        match node.kind() {
            NodeKind::Function(func) => {
                assert!(func.is_async());
                assert!(!func.is_generator());
            }
            _ => panic!("expected function kind"),
        }
    }
}
