// Copyright 2026 Wireflow contributors

//! The execution engine: configuration and run entry points.
//!
//! A [`Runner`] holds execution policy - concurrency limit, iteration
//! budget, wall-clock timeout, cache and checkpoint backends, observers -
//! and runs any graph any number of times. Four entry points:
//!
//! - [`Runner::run`]: asynchronous execution to a terminal status
//!   (completed, suspended on an interrupt, or stopped);
//! - [`Runner::resume`]: continue a suspended run from its checkpoint;
//! - [`Runner::run_sync`]: blocking execution for graphs of purely
//!   synchronous nodes, no async runtime required;
//! - [`Runner::map`]: batch fan-out, one run per input combination.
//!
//! Runners are cheap and reusable; state for each run lives in its own
//! value store.

mod execution;
mod map;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

use crate::cache::CacheBackend;
use crate::checkpoint::{Checkpoint, Checkpointer, InterruptDescriptor};
use crate::error::{Error, Result};
use crate::event::EventObserver;
use crate::graph::Graph;
use crate::node::{MapMode, MapSpec};
use crate::store::ValueStore;
use crate::value::ValueMap;

use execution::{ExecContext, SeenVersions};

/// Default limit on concurrently executing nodes.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default number of routing loop-backs before a cyclic run is aborted.
pub const DEFAULT_ITERATION_BUDGET: u32 = 100;

/// Default wall-clock limit for one run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The graph quiesced (or a gate selected END); outputs are final.
    Completed,
    /// An unresolved interrupt surfaced; resume with a response.
    Suspended,
    /// A stop request ended the run early; outputs are partial.
    Stopped,
}

/// Result of [`Runner::run`] or [`Runner::resume`].
#[derive(Debug)]
pub struct RunResult {
    /// Identifier of this run; stable across suspend/resume.
    pub run_id: String,
    /// How the run ended.
    pub status: RunStatus,
    /// Every value the graph's nodes produced (partial unless completed).
    pub outputs: ValueMap,
    /// The interrupt awaiting a response, when suspended.
    pub interrupt: Option<InterruptDescriptor>,
    /// Snapshot to pass to [`Runner::resume`], when suspended.
    pub checkpoint: Option<Checkpoint>,
    /// Node executions performed, cache hits and gates included.
    pub nodes_executed: usize,
    /// Wall-clock duration of this run segment.
    pub duration: Duration,
}

/// Cooperative stop switch for a runner's runs.
///
/// Stopping is latched: in-flight nodes finish, nothing new starts, and
/// affected runs end with [`RunStatus::Stopped`].
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a stop.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True if a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Configurable graph executor.
pub struct Runner {
    concurrency: usize,
    budget: u32,
    timeout: Option<Duration>,
    cache: Option<Arc<dyn CacheBackend>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    observers: Vec<Arc<dyn EventObserver>>,
    stop: Arc<AtomicBool>,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            budget: DEFAULT_ITERATION_BUDGET,
            timeout: Some(DEFAULT_RUN_TIMEOUT),
            cache: None,
            checkpointer: None,
            observers: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Runner {
    /// Runner with default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit on concurrently executing nodes (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Number of routing loop-backs allowed before the run aborts with
    /// [`Error::InfiniteLoop`].
    #[must_use]
    pub fn with_iteration_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    /// Wall-clock limit for one run. Not applied by [`Runner::run_sync`].
    #[must_use]
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Remove the wall-clock limit.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Attach a cache backend. Without one, `with_cache` flags on nodes are
    /// inert.
    #[must_use]
    pub fn with_cache(mut self, cache: impl CacheBackend + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Attach a checkpoint backend; suspended runs are persisted to it and
    /// deleted again on completion.
    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: impl Checkpointer + 'static) -> Self {
        self.checkpointer = Some(Arc::new(checkpointer));
        self
    }

    /// Attach an event observer; several may be attached.
    #[must_use]
    pub fn with_observer(mut self, observer: impl EventObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Handle for requesting a cooperative stop of this runner's runs.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop),
        }
    }

    /// Execute `graph` with the given inputs.
    ///
    /// # Errors
    ///
    /// [`Error::MissingInput`] if a required input is absent; any node,
    /// routing, budget or timeout error raised mid-run. A suspension is not
    /// an error - it comes back as [`RunStatus::Suspended`].
    pub async fn run(&self, graph: &Graph, inputs: ValueMap) -> Result<RunResult> {
        Self::validate_inputs(graph, &inputs)?;
        let store = execution::seed_store(graph, inputs);
        let run_id = Uuid::new_v4().to_string();
        self.drive(graph, run_id, store, SeenVersions::new(), 0).await
    }

    /// Continue a suspended run. Responses are written as fresh values, so
    /// everything downstream of them re-executes while already-completed
    /// nodes stay settled.
    ///
    /// Resuming without the awaited response suspends again at the same
    /// interrupt.
    ///
    /// # Errors
    ///
    /// As for [`Runner::run`].
    pub async fn resume(
        &self,
        graph: &Graph,
        checkpoint: Checkpoint,
        responses: ValueMap,
    ) -> Result<RunResult> {
        let scope = graph.name().to_string();
        let seen = checkpoint
            .seen_versions
            .get(&scope)
            .cloned()
            .unwrap_or_default();
        let mut store = checkpoint.store;
        store.write_all(responses);
        self.drive(graph, checkpoint.run_id, store, seen, checkpoint.iterations)
            .await
    }

    /// Blocking execution for graphs of purely synchronous nodes. Needs no
    /// async runtime and ignores the configured timeout.
    ///
    /// # Errors
    ///
    /// [`Error::IncompatibleGraph`] if the graph (recursively through
    /// composites) contains async, generator or interrupt nodes; otherwise
    /// as for [`Runner::run`].
    pub fn run_sync(&self, graph: &Graph, inputs: ValueMap) -> Result<ValueMap> {
        if graph.has_async_nodes() {
            return Err(Error::IncompatibleGraph {
                operation: "run_sync",
                reason: "it contains async or generator nodes; use run() on an async runtime"
                    .to_string(),
            });
        }
        if graph.has_interrupts() {
            return Err(Error::IncompatibleGraph {
                operation: "run_sync",
                reason: "it contains interrupt nodes, which may suspend; use run() and resume()"
                    .to_string(),
            });
        }
        Self::validate_inputs(graph, &inputs)?;
        let ctx = self.context(Uuid::new_v4().to_string());
        let store = execution::seed_store(graph, inputs);
        let outcome = futures::executor::block_on(execution::execute_scope(
            Arc::clone(&ctx),
            Arc::new(graph.clone()),
            graph.name().to_string(),
            store,
            SeenVersions::new(),
            0,
        ))?;
        Ok(execution::collect_outputs(graph, &outcome.store))
    }

    /// Batch fan-out: run `graph` once per combination of the `over`
    /// inputs (which must hold arrays), returning each run's outputs in
    /// iteration order.
    ///
    /// # Errors
    ///
    /// [`Error::IncompatibleGraph`] if the graph contains interrupt nodes;
    /// [`Error::NotIterable`] / [`Error::ZipLengthMismatch`] for malformed
    /// mapped inputs; otherwise as for [`Runner::run`].
    pub async fn map(
        &self,
        graph: &Graph,
        inputs: ValueMap,
        over: impl IntoIterator<Item = impl Into<String>>,
        mode: MapMode,
    ) -> Result<Vec<ValueMap>> {
        if graph.has_interrupts() {
            return Err(Error::IncompatibleGraph {
                operation: "map",
                reason: "it contains interrupt nodes, which cannot suspend inside a batch; attach resolvers or run iterations individually".to_string(),
            });
        }
        let spec = MapSpec {
            names: over.into_iter().map(Into::into).collect(),
            mode,
        };
        let combos = map::combinations(&inputs, &spec)?;
        for combo in &combos {
            Self::validate_inputs(graph, combo)?;
        }

        let ctx = self.context(Uuid::new_v4().to_string());
        let shared = Arc::new(graph.clone());
        let runs: Vec<_> = combos
            .into_iter()
            .enumerate()
            .map(|(i, combo)| {
                let store = execution::seed_store(graph, combo);
                execution::execute_scope(
                    Arc::clone(&ctx),
                    Arc::clone(&shared),
                    format!("{}[{i}]", graph.name()),
                    store,
                    SeenVersions::new(),
                    0,
                )
            })
            .collect();
        let outcomes = join_all(runs).await;
        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let outcome = outcome?;
            if outcome.status != RunStatus::Completed {
                return Err(Error::msg(
                    "batch iteration was stopped before completion",
                ));
            }
            results.push(execution::collect_outputs(graph, &outcome.store));
        }
        Ok(results)
    }

    async fn drive(
        &self,
        graph: &Graph,
        run_id: String,
        store: ValueStore,
        seen: SeenVersions,
        iterations: u32,
    ) -> Result<RunResult> {
        let started = Instant::now();
        let ctx = self.context(run_id.clone());
        let scope = graph.name().to_string();
        info!(run_id = %run_id, graph = %scope, "run starting");

        let fut = execution::execute_scope(
            Arc::clone(&ctx),
            Arc::new(graph.clone()),
            scope.clone(),
            store,
            seen,
            iterations,
        );
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome?,
                Err(_) => return Err(Error::Timeout(limit)),
            },
            None => fut.await?,
        };

        let outputs = execution::collect_outputs(graph, &outcome.store);
        let nodes_executed = ctx.executed.load(Ordering::Relaxed);
        let duration = started.elapsed();
        info!(run_id = %run_id, status = ?outcome.status, nodes_executed, "run finished");

        match outcome.status {
            RunStatus::Suspended => {
                let mut seen_versions = BTreeMap::new();
                seen_versions.insert(scope, outcome.seen);
                let checkpoint = Checkpoint {
                    run_id: run_id.clone(),
                    store: outcome.store,
                    seen_versions,
                    pending_interrupt: outcome.pending.clone(),
                    iterations: outcome.iterations,
                };
                if let Some(checkpointer) = &self.checkpointer {
                    checkpointer.save(&checkpoint)?;
                }
                Ok(RunResult {
                    run_id,
                    status: RunStatus::Suspended,
                    outputs,
                    interrupt: outcome.pending,
                    checkpoint: Some(checkpoint),
                    nodes_executed,
                    duration,
                })
            }
            status => {
                if status == RunStatus::Completed {
                    if let Some(checkpointer) = &self.checkpointer {
                        checkpointer.delete(&run_id)?;
                    }
                }
                Ok(RunResult {
                    run_id,
                    status,
                    outputs,
                    interrupt: None,
                    checkpoint: None,
                    nodes_executed,
                    duration,
                })
            }
        }
    }

    fn context(&self, run_id: String) -> Arc<ExecContext> {
        Arc::new(ExecContext {
            run_id,
            semaphore: Arc::new(Semaphore::new(self.concurrency)),
            cache: self.cache.clone(),
            observers: self.observers.clone(),
            stop: Arc::clone(&self.stop),
            budget: self.budget,
            executed: AtomicUsize::new(0),
        })
    }

    fn validate_inputs(graph: &Graph, inputs: &ValueMap) -> Result<()> {
        for name in &graph.inputs().required {
            if !inputs.contains_key(name) {
                return Err(Error::MissingInput {
                    input: name.clone(),
                });
            }
        }
        Ok(())
    }
}
