// Copyright 2026 Wireflow contributors

//! Interrupt nodes: human-in-the-loop pause points.
//!
//! An interrupt has exactly one input and one output. When it becomes ready
//! the engine resolves it in priority order:
//!
//! 1. a response value already in the store under the node's response key
//!    (supplied on resume, or pre-provided for replay);
//! 2. the resolver function, if attached and returning `Ok(Some(_))`;
//! 3. otherwise the run suspends, surfacing the input value and the response
//!    key the caller must supply to continue.
//!
//! A resolver returning `Ok(None)` means "no value" and suspends; a resolver
//! returning `Err` is a runtime error, not a suspension.

use std::sync::Arc;

use crate::error::Result;
use crate::value::Value;

use super::{InputSlot, Node, NodeKind, OutputSlot};

pub(crate) type ResolverFn = Arc<dyn Fn(&Value) -> Result<Option<Value>> + Send + Sync>;

/// A pause point in the graph.
#[derive(Clone, Default)]
pub struct InterruptNode {
    pub(crate) resolver: Option<ResolverFn>,
}

impl InterruptNode {
    /// True if a resolver function is attached.
    #[must_use]
    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }
}

/// Store key under which a resume response for `node` is expected.
///
/// Returned to the caller inside the interrupt descriptor; pass the response
/// under this key when resuming (or provide it up front to replay a run
/// without suspension).
#[must_use]
pub fn interrupt_response_key(node: &str) -> String {
    format!("{node}.response")
}

impl Node {
    /// Interrupt node surfacing `input` and producing `output` once a
    /// response is available.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let approve = Node::interrupt("approve", "draft", "approved");
    /// // ... run suspends at `approve`, caller resumes with a response
    /// ```
    pub fn interrupt(
        name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            vec![InputSlot::data(input)],
            vec![OutputSlot::data(output)],
            NodeKind::Interrupt(InterruptNode::default()),
        )
    }

    /// Attach a resolver tried before suspending. Returning `Ok(None)`
    /// still suspends; returning `Err` fails the run.
    #[must_use]
    pub fn with_resolver<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        if let NodeKind::Interrupt(interrupt) = &mut self.kind {
            interrupt.resolver = Some(Arc::new(f));
        } else {
            debug_assert!(false, "with_resolver: '{}' is not an interrupt", self.name);
        }
        self
    }
}
