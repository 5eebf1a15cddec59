// Copyright 2026 Wireflow contributors

//! The scheduling loop.
//!
//! Execution is staleness-driven, not plan-driven: there is no topological
//! order and no program counter. Each pass over the graph asks one
//! question per node - are all inputs available, and has any of them been
//! rewritten since this node last ran? The loop then works in strict
//! priority order:
//!
//! 1. routing gates, one per pass, so a decision lands before any branch
//!    can race it;
//! 2. computation nodes (functions and composites), all runnable ones
//!    concurrently under the semaphore, with their writes applied serially
//!    in declaration order so store versions stay deterministic;
//! 3. interrupts, only once no computation is pending, so the surfaced
//!    value is final.
//!
//! Nodes named in a gate's target list are gated: they run only when a
//! decision selects them. The one exception is a target that can reach its
//! own gate through the data flow - a cycle - which may run unforced to
//! bootstrap the first iteration; afterwards the gate alone decides
//! whether the loop continues.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::cache::CacheBackend;
use crate::checkpoint::InterruptDescriptor;
use crate::error::{Error, Result};
use crate::event::{EventObserver, GraphEvent};
use crate::graph::{Graph, END};
use crate::node::{interrupt_response_key, FnBody, Node, NodeKind};
use crate::store::ValueStore;
use crate::value::{cache_key, Value, ValueMap};

use super::map::combinations;
use super::RunStatus;

/// Per-node input versions observed at each node's last execution,
/// keyed node name -> input name -> store version.
pub(crate) type SeenVersions = BTreeMap<String, BTreeMap<String, u64>>;

/// Shared state for one top-level run, including all nested scopes.
pub(crate) struct ExecContext {
    pub(crate) run_id: String,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) cache: Option<Arc<dyn CacheBackend>>,
    pub(crate) observers: Vec<Arc<dyn EventObserver>>,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) budget: u32,
    pub(crate) executed: AtomicUsize,
}

impl ExecContext {
    fn emit(&self, event: GraphEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

/// How one scope (a top-level run or a nested composite run) ended.
pub(crate) struct ScopeOutcome {
    pub(crate) status: RunStatus,
    pub(crate) store: ValueStore,
    pub(crate) seen: BTreeMap<String, BTreeMap<String, u64>>,
    pub(crate) pending: Option<InterruptDescriptor>,
    pub(crate) iterations: u32,
}

struct NodeExecution {
    yields: Vec<ValueMap>,
    cache_hit: bool,
    duration: Duration,
}

enum InterruptStep {
    Resolved,
    Suspend(InterruptDescriptor),
}

/// Seed a fresh store for a scope: bound values first, then the caller's
/// inputs (which therefore override bindings of the same name).
pub(crate) fn seed_store(graph: &Graph, inputs: ValueMap) -> ValueStore {
    let mut store = ValueStore::new();
    for (name, value) in graph.bound() {
        store.write(name.clone(), value.clone());
    }
    store.write_all(inputs);
    store
}

/// Everything the graph's nodes produced, pulled from the store: every
/// declared data output that has a value, in declaration order.
pub(crate) fn collect_outputs(graph: &Graph, store: &ValueStore) -> ValueMap {
    let mut outputs = ValueMap::new();
    for node in graph.nodes() {
        for name in node.output_names() {
            if let Some(value) = store.get(name) {
                outputs.insert(name.to_string(), value.clone());
            }
        }
    }
    outputs
}

/// Run one scope to a terminal status. Boxed for recursion through
/// composite nodes.
pub(crate) fn execute_scope(
    ctx: Arc<ExecContext>,
    graph: Arc<Graph>,
    scope: String,
    store: ValueStore,
    seen: SeenVersions,
    iterations: u32,
) -> BoxFuture<'static, Result<ScopeOutcome>> {
    Box::pin(run_scope(ctx, graph, scope, store, seen, iterations))
}

async fn run_scope(
    ctx: Arc<ExecContext>,
    graph: Arc<Graph>,
    scope: String,
    mut store: ValueStore,
    mut seen: SeenVersions,
    mut iterations: u32,
) -> Result<ScopeOutcome> {
    let started = Instant::now();
    ctx.emit(GraphEvent::RunStarted {
        run_id: ctx.run_id.clone(),
        graph: graph.name().to_string(),
        scope: scope.clone(),
    });
    debug!(run_id = %ctx.run_id, scope = %scope, "scope started");

    let gated = graph.gated_nodes();
    let bootstrap = cycle_bootstrap(&graph, &gated);
    let mut forced: BTreeSet<String> = BTreeSet::new();
    let mut pending: Option<InterruptDescriptor> = None;

    let status = loop {
        if ctx.stop.load(Ordering::Relaxed) {
            ctx.emit(GraphEvent::StopRequested {
                run_id: ctx.run_id.clone(),
                scope: scope.clone(),
            });
            break RunStatus::Stopped;
        }

        // Gates first: a pending decision must land before branches run.
        if let Some(node) = next_runnable(&graph, NodePhase::Gate, &store, &seen, &gated, &bootstrap, &forced)
        {
            forced.remove(node.name());
            let gate_started = Instant::now();
            let resolved = resolve_inputs(&node, &store);
            record_seen(&mut seen, &node, &store);
            ctx.emit(GraphEvent::NodeStarted {
                run_id: ctx.run_id.clone(),
                scope: scope.clone(),
                node: node.name().to_string(),
            });
            let target = match node.kind() {
                NodeKind::Gate(gate) => gate.dispatch(node.name(), &resolved)?,
                _ => return Err(Error::Internal("gate phase selected a non-gate node".to_string())),
            };
            ctx.executed.fetch_add(1, Ordering::Relaxed);
            ctx.emit(GraphEvent::NodeFinished {
                run_id: ctx.run_id.clone(),
                scope: scope.clone(),
                node: node.name().to_string(),
                duration: gate_started.elapsed(),
                cache_hit: false,
            });
            ctx.emit(GraphEvent::RoutingDecision {
                run_id: ctx.run_id.clone(),
                scope: scope.clone(),
                gate: node.name().to_string(),
                target: target.clone(),
            });
            debug!(run_id = %ctx.run_id, scope = %scope, gate = node.name(), %target, "routing decision");
            if target == END {
                break RunStatus::Completed;
            }
            iterations += 1;
            if iterations > ctx.budget {
                return Err(Error::InfiniteLoop { budget: ctx.budget });
            }
            forced.insert(target);
            continue;
        }

        // All runnable computation nodes, concurrently.
        let batch = runnable_batch(&graph, &store, &seen, &gated, &bootstrap, &forced);
        if !batch.is_empty() {
            let mut jobs = Vec::with_capacity(batch.len());
            for node in &batch {
                forced.remove(node.name());
                let resolved = resolve_inputs(node, &store);
                record_seen(&mut seen, node, &store);
                ctx.emit(GraphEvent::NodeStarted {
                    run_id: ctx.run_id.clone(),
                    scope: scope.clone(),
                    node: node.name().to_string(),
                });
                jobs.push(execute_node(
                    Arc::clone(&ctx),
                    Arc::clone(node),
                    scope.clone(),
                    resolved,
                ));
            }
            let results = join_all(jobs).await;
            // Writes land serially, in declaration order, for deterministic
            // store versions regardless of completion order.
            for (node, result) in batch.iter().zip(results) {
                let execution = result?;
                apply_writes(&mut store, node, &execution.yields)?;
                ctx.executed.fetch_add(1, Ordering::Relaxed);
                ctx.emit(GraphEvent::NodeFinished {
                    run_id: ctx.run_id.clone(),
                    scope: scope.clone(),
                    node: node.name().to_string(),
                    duration: execution.duration,
                    cache_hit: execution.cache_hit,
                });
            }
            continue;
        }

        // Interrupts fire only when no computation is pending, so the
        // surfaced value is final.
        if let Some(node) = next_runnable(&graph, NodePhase::Interrupt, &store, &seen, &gated, &bootstrap, &forced)
        {
            forced.remove(node.name());
            match settle_interrupt(&ctx, &node, &scope, &mut store, &mut seen)? {
                InterruptStep::Resolved => continue,
                InterruptStep::Suspend(descriptor) => {
                    ctx.emit(GraphEvent::InterruptRaised {
                        run_id: ctx.run_id.clone(),
                        scope: scope.clone(),
                        node: descriptor.node.clone(),
                        value: descriptor.value.clone(),
                        response_key: descriptor.response_key.clone(),
                    });
                    debug!(run_id = %ctx.run_id, scope = %scope, node = %descriptor.node, "run suspended");
                    pending = Some(descriptor);
                    break RunStatus::Suspended;
                }
            }
        }

        // Quiescent. A leftover routed target means its inputs never
        // materialized; surface the first missing one.
        if let Some(name) = forced.iter().next() {
            let missing = graph.node(name).and_then(|node| {
                node.inputs()
                    .iter()
                    .find(|slot| !store.contains(&slot.name) && !slot.is_satisfied_by_default())
                    .map(|slot| slot.name.clone())
            });
            return Err(match missing {
                Some(input) => Error::MissingInput { input },
                None => Error::Internal(format!("routed target '{name}' never became runnable")),
            });
        }
        break RunStatus::Completed;
    };

    ctx.emit(GraphEvent::RunFinished {
        run_id: ctx.run_id.clone(),
        scope: scope.clone(),
        status,
        duration: started.elapsed(),
    });
    debug!(run_id = %ctx.run_id, scope = %scope, ?status, "scope finished");
    Ok(ScopeOutcome {
        status,
        store,
        seen,
        pending,
        iterations,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodePhase {
    Gate,
    Interrupt,
}

fn phase_matches(node: &Node, phase: NodePhase) -> bool {
    match phase {
        NodePhase::Gate => matches!(node.kind(), NodeKind::Gate(_)),
        NodePhase::Interrupt => matches!(node.kind(), NodeKind::Interrupt(_)),
    }
}

fn next_runnable(
    graph: &Graph,
    phase: NodePhase,
    store: &ValueStore,
    seen: &SeenVersions,
    gated: &BTreeSet<String>,
    bootstrap: &BTreeSet<String>,
    forced: &BTreeSet<String>,
) -> Option<Arc<Node>> {
    graph
        .nodes
        .iter()
        .find(|node| phase_matches(node, phase) && runnable(node, store, seen, gated, bootstrap, forced))
        .map(Arc::clone)
}

fn runnable_batch(
    graph: &Graph,
    store: &ValueStore,
    seen: &SeenVersions,
    gated: &BTreeSet<String>,
    bootstrap: &BTreeSet<String>,
    forced: &BTreeSet<String>,
) -> Vec<Arc<Node>> {
    graph
        .nodes
        .iter()
        .filter(|node| {
            matches!(node.kind(), NodeKind::Function(_) | NodeKind::Composite(_))
                && runnable(node, store, seen, gated, bootstrap, forced)
        })
        .map(Arc::clone)
        .collect()
}

/// Core eligibility rule: ready, and either forced by a routing decision
/// or stale (gated nodes additionally need the cycle-bootstrap exemption
/// to run unforced).
fn runnable(
    node: &Node,
    store: &ValueStore,
    seen: &SeenVersions,
    gated: &BTreeSet<String>,
    bootstrap: &BTreeSet<String>,
    forced: &BTreeSet<String>,
) -> bool {
    if !ready(node, store) {
        return false;
    }
    if forced.contains(node.name()) {
        return true;
    }
    if gated.contains(node.name()) && !bootstrap.contains(node.name()) {
        return false;
    }
    is_stale(node, store, seen)
}

fn ready(node: &Node, store: &ValueStore) -> bool {
    node.inputs()
        .iter()
        .all(|slot| store.contains(&slot.name) || slot.is_satisfied_by_default())
}

fn is_stale(node: &Node, store: &ValueStore, seen: &SeenVersions) -> bool {
    let Some(last_seen) = seen.get(node.name()) else {
        return true;
    };
    node.inputs().iter().any(|slot| {
        match (store.version(&slot.name), last_seen.get(&slot.name)) {
            (Some(current), Some(observed)) => current > *observed,
            (Some(_), None) => true,
            _ => false,
        }
    })
}

/// Resolved data inputs for one execution: store value, else declared
/// default, else omitted (optional slots only - readiness guarantees the
/// rest). Ordering slots carry no data and are excluded.
fn resolve_inputs(node: &Node, store: &ValueStore) -> ValueMap {
    let mut resolved = ValueMap::new();
    for slot in node.inputs() {
        if slot.ordering {
            continue;
        }
        if let Some(value) = store.get(&slot.name) {
            resolved.insert(slot.name.clone(), value.clone());
        } else if let Some(default) = &slot.default {
            resolved.insert(slot.name.clone(), default.clone());
        }
    }
    resolved
}

fn record_seen(seen: &mut SeenVersions, node: &Node, store: &ValueStore) {
    let entry = seen.entry(node.name().to_string()).or_default();
    for slot in node.inputs() {
        if let Some(version) = store.version(&slot.name) {
            entry.insert(slot.name.clone(), version);
        }
    }
}

/// Gated nodes that may run unforced to bootstrap a cycle: targets that
/// can reach their own gate through the data flow.
fn cycle_bootstrap(graph: &Graph, gated: &BTreeSet<String>) -> BTreeSet<String> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in graph.edges() {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }
    let mut bootstrap = BTreeSet::new();
    for node in graph.nodes() {
        if let NodeKind::Gate(gate) = node.kind() {
            for target in gate.targets() {
                if target == END || !gated.contains(target.as_str()) {
                    continue;
                }
                if reaches(&adjacency, target, node.name()) {
                    bootstrap.insert(target.clone());
                }
            }
        }
    }
    bootstrap
}

fn reaches(adjacency: &BTreeMap<&str, Vec<&str>>, from: &str, to: &str) -> bool {
    let mut queue = vec![from];
    let mut visited = BTreeSet::new();
    while let Some(current) = queue.pop() {
        if current == to {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = adjacency.get(current) {
            queue.extend(next.iter().copied());
        }
    }
    false
}

/// Apply a node's yields to the store: declared data outputs per yield (a
/// function must produce every one), then its ordering tokens as null.
fn apply_writes(store: &mut ValueStore, node: &Node, yields: &[ValueMap]) -> Result<()> {
    for output in yields {
        for slot in node.outputs() {
            if slot.ordering {
                continue;
            }
            match output.get(&slot.name) {
                Some(value) => {
                    store.write(slot.name.clone(), value.clone());
                }
                None => {
                    // A composite's leaf output may legitimately be absent
                    // when an inner branch was skipped.
                    if matches!(node.kind(), NodeKind::Function(_)) {
                        return Err(Error::OutputMismatch {
                            node: node.name().to_string(),
                            output: slot.name.clone(),
                        });
                    }
                }
            }
        }
    }
    for slot in node.outputs() {
        if slot.ordering {
            store.write(slot.name.clone(), Value::Null);
        }
    }
    Ok(())
}

async fn execute_node(
    ctx: Arc<ExecContext>,
    node: Arc<Node>,
    scope: String,
    resolved: ValueMap,
) -> Result<NodeExecution> {
    let started = Instant::now();
    let result = match node.kind() {
        NodeKind::Function(_) => run_function(&ctx, &node, resolved).await,
        NodeKind::Composite(_) => run_composite(&ctx, &node, &scope, resolved)
            .await
            .map(|outputs| (vec![outputs], false)),
        _ => Err(Error::Internal(
            "computation phase selected a control node".to_string(),
        )),
    };
    match result {
        Ok((yields, cache_hit)) => Ok(NodeExecution {
            yields,
            cache_hit,
            duration: started.elapsed(),
        }),
        Err(source) => Err(Error::NodeExecution {
            node: node.name().to_string(),
            source: Box::new(source),
        }),
    }
}

async fn run_function(
    ctx: &ExecContext,
    node: &Node,
    resolved: ValueMap,
) -> Result<(Vec<ValueMap>, bool)> {
    let _permit = ctx
        .semaphore
        .acquire()
        .await
        .map_err(|_| Error::Internal("execution semaphore closed".to_string()))?;

    let key = match (&ctx.cache, node.cache_enabled()) {
        (Some(_), true) => Some(cache_key(&node.fingerprint(), &resolved)?),
        _ => None,
    };
    if let (Some(key), Some(cache)) = (&key, &ctx.cache) {
        if let Some(hit) = cache.lookup(key)? {
            let yields: Vec<ValueMap> = serde_json::from_value(hit)?;
            debug!(run_id = %ctx.run_id, node = node.name(), "cache hit");
            return Ok((yields, true));
        }
    }

    let body = match node.kind() {
        NodeKind::Function(func) => &func.body,
        _ => {
            return Err(Error::Internal(
                "run_function called on a non-function node".to_string(),
            ))
        }
    };
    let yields = match body {
        FnBody::Sync(f) => vec![f(&resolved)?],
        FnBody::Async(f) => vec![f(resolved).await?],
        FnBody::Generator(f) => f(resolved).await?,
    };

    if let (Some(key), Some(cache)) = (&key, &ctx.cache) {
        cache.store(key, &serde_json::to_value(&yields)?)?;
    }
    Ok((yields, false))
}

async fn run_composite(
    ctx: &Arc<ExecContext>,
    node: &Node,
    scope: &str,
    resolved: ValueMap,
) -> Result<ValueMap> {
    let inner = match node.kind() {
        NodeKind::Composite(composite) => Arc::clone(&composite.graph),
        _ => {
            return Err(Error::Internal(
                "run_composite called on a non-composite node".to_string(),
            ))
        }
    };

    if let Some(spec) = node.map_spec() {
        let combos = combinations(&resolved, spec)?;
        let mut runs = Vec::with_capacity(combos.len());
        for (i, combo) in combos.into_iter().enumerate() {
            let store = seed_store(&inner, combo);
            runs.push(execute_scope(
                Arc::clone(ctx),
                Arc::clone(&inner),
                format!("{scope}/{}[{i}]", node.name()),
                store,
                SeenVersions::new(),
                0,
            ));
        }
        let outcomes = join_all(runs).await;
        let mut collected: Vec<ValueMap> = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let outcome = outcome?;
            ensure_completed(node, &outcome)?;
            collected.push(collect_outputs(&inner, &outcome.store));
        }
        let mut outputs = ValueMap::new();
        for name in node.output_names() {
            let column: Vec<Value> = collected
                .iter()
                .map(|iteration| iteration.get(name).cloned().unwrap_or(Value::Null))
                .collect();
            outputs.insert(name.to_string(), Value::Array(column));
        }
        Ok(outputs)
    } else {
        let store = seed_store(&inner, resolved);
        let outcome = execute_scope(
            Arc::clone(ctx),
            Arc::clone(&inner),
            format!("{scope}/{}", node.name()),
            store,
            SeenVersions::new(),
            0,
        )
        .await?;
        ensure_completed(node, &outcome)?;
        let inner_outputs = collect_outputs(&inner, &outcome.store);
        Ok(node
            .output_names()
            .filter_map(|name| {
                inner_outputs
                    .get(name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect())
    }
}

fn ensure_completed(node: &Node, outcome: &ScopeOutcome) -> Result<()> {
    match outcome.status {
        RunStatus::Completed => Ok(()),
        RunStatus::Suspended => Err(Error::msg(format!(
            "inner graph of composite '{}' suspended on an interrupt. Interrupts inside composites cannot suspend the outer run; attach a resolver or provide the response up front",
            node.name()
        ))),
        RunStatus::Stopped => Err(Error::msg(format!(
            "inner graph of composite '{}' was stopped before completion",
            node.name()
        ))),
    }
}

/// Resolve an interrupt in priority order: a fresh response in the store,
/// then the resolver function, otherwise suspend.
fn settle_interrupt(
    ctx: &ExecContext,
    node: &Arc<Node>,
    scope: &str,
    store: &mut ValueStore,
    seen: &mut SeenVersions,
) -> Result<InterruptStep> {
    let started = Instant::now();
    ctx.emit(GraphEvent::NodeStarted {
        run_id: ctx.run_id.clone(),
        scope: scope.to_string(),
        node: node.name().to_string(),
    });

    let resolved = resolve_inputs(node, store);
    let input_value = node
        .inputs()
        .first()
        .and_then(|slot| resolved.get(&slot.name))
        .cloned()
        .unwrap_or(Value::Null);
    let response_key = interrupt_response_key(node.name());

    // A stored response counts only if it is newer than the one this node
    // last consumed; a stale response must not satisfy a later iteration.
    let fresh = match (
        store.version(&response_key),
        seen.get(node.name()).and_then(|m| m.get(&response_key)),
    ) {
        (Some(current), Some(consumed)) => current > *consumed,
        (Some(_), None) => true,
        _ => false,
    };
    let mut response = if fresh {
        store.get(&response_key).cloned()
    } else {
        None
    };

    if response.is_none() {
        if let NodeKind::Interrupt(interrupt) = node.kind() {
            if let Some(resolver) = &interrupt.resolver {
                response = resolver(&input_value).map_err(|source| Error::NodeExecution {
                    node: node.name().to_string(),
                    source: Box::new(source),
                })?;
            }
        }
    }

    match response {
        Some(value) => {
            // Persist the response so checkpoints replay identically, then
            // record it as consumed.
            store.write(response_key.clone(), value.clone());
            record_seen(seen, node, store);
            if let Some(version) = store.version(&response_key) {
                seen.entry(node.name().to_string())
                    .or_default()
                    .insert(response_key, version);
            }
            if let Some(output) = node.output_names().next() {
                store.write(output.to_string(), value);
            }
            ctx.executed.fetch_add(1, Ordering::Relaxed);
            ctx.emit(GraphEvent::NodeFinished {
                run_id: ctx.run_id.clone(),
                scope: scope.to_string(),
                node: node.name().to_string(),
                duration: started.elapsed(),
                cache_hit: false,
            });
            Ok(InterruptStep::Resolved)
        }
        None => Ok(InterruptStep::Suspend(InterruptDescriptor {
            node: node.name().to_string(),
            value: input_value,
            response_key,
        })),
    }
}
