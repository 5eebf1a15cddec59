//! Result caching: content-addressed keys over definition fingerprint and
//! resolved inputs, hit short-circuiting, and backend persistence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use wireflow::{
    CollectingObserver, Error, FileCache, Graph, GraphEvent, MemoryCache, Node, Runner, Value,
    ValueMap,
};

mod common;

fn inputs(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

fn out(name: &str, value: Value) -> ValueMap {
    [(name.to_string(), value)].into()
}

fn counted_square(runs: &Arc<AtomicUsize>) -> Node {
    let counter = Arc::clone(runs);
    Node::function("square", ["x"], ["y"], move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let x = args["x"].as_i64().unwrap_or(0);
        Ok(out("y", json!(x * x)))
    })
    .with_cache()
}

#[tokio::test]
async fn test_cache_hit_skips_execution_and_flags_event() -> Result<(), Error> {
    common::init_tracing();
    let runs = Arc::new(AtomicUsize::new(0));
    let graph = Graph::new(vec![counted_square(&runs)])?;
    let observer = Arc::new(CollectingObserver::new());
    let runner = Runner::new()
        .with_cache(MemoryCache::new())
        .with_observer(Arc::clone(&observer));

    let first = runner.run(&graph, inputs(&[("x", json!(4))])).await?;
    let second = runner.run(&graph, inputs(&[("x", json!(4))])).await?;

    assert_eq!(first.outputs["y"], json!(16));
    assert_eq!(second.outputs["y"], json!(16));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let hits: Vec<bool> = observer
        .events()
        .iter()
        .filter_map(|event| match event {
            GraphEvent::NodeFinished { node, cache_hit, .. } if node == "square" => {
                Some(*cache_hit)
            }
            _ => None,
        })
        .collect();
    assert_eq!(hits, vec![false, true]);
    Ok(())
}

#[tokio::test]
async fn test_different_inputs_miss_the_cache() -> Result<(), Error> {
    let runs = Arc::new(AtomicUsize::new(0));
    let graph = Graph::new(vec![counted_square(&runs)])?;
    let runner = Runner::new().with_cache(MemoryCache::new());

    runner.run(&graph, inputs(&[("x", json!(4))])).await?;
    runner.run(&graph, inputs(&[("x", json!(5))])).await?;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_fingerprint_tag_invalidates_stale_entries() -> Result<(), Error> {
    let cache = Arc::new(MemoryCache::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let v1 = Graph::new(vec![counted_square(&runs)])?;
    let v2 = Graph::new(vec![counted_square(&runs).with_fingerprint("v2")])?;

    let runner = Runner::new().with_cache(Arc::clone(&cache));
    runner.run(&v1, inputs(&[("x", json!(4))])).await?;
    runner.run(&v2, inputs(&[("x", json!(4))])).await?;

    // Same name, same shape, same inputs - but the tag changed the key.
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cache_flag_without_backend_is_inert() -> Result<(), Error> {
    let runs = Arc::new(AtomicUsize::new(0));
    let graph = Graph::new(vec![counted_square(&runs)])?;
    let runner = Runner::new();

    runner.run(&graph, inputs(&[("x", json!(4))])).await?;
    runner.run(&graph, inputs(&[("x", json!(4))])).await?;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_uncached_nodes_always_execute() -> Result<(), Error> {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let plain = Node::function("plain", ["x"], ["y"], move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(out("y", args["x"].clone()))
    });
    let graph = Graph::new(vec![plain])?;
    let runner = Runner::new().with_cache(MemoryCache::new());

    runner.run(&graph, inputs(&[("x", json!(4))])).await?;
    runner.run(&graph, inputs(&[("x", json!(4))])).await?;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_file_cache_survives_across_runners() -> Result<(), Error> {
    let dir = tempfile::tempdir().map_err(|e| Error::msg(e.to_string()))?;
    let runs = Arc::new(AtomicUsize::new(0));
    let graph = Graph::new(vec![counted_square(&runs)])?;

    let first_runner = Runner::new().with_cache(FileCache::new(dir.path())?);
    first_runner.run(&graph, inputs(&[("x", json!(9))])).await?;

    // A brand-new runner over the same directory sees the entry.
    let second_runner = Runner::new().with_cache(FileCache::new(dir.path())?);
    let result = second_runner.run(&graph, inputs(&[("x", json!(9))])).await?;

    assert_eq!(result.outputs["y"], json!(81));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_cached_hit_still_feeds_downstream() -> Result<(), Error> {
    let runs = Arc::new(AtomicUsize::new(0));
    let add_one = Node::function("add_one", ["y"], ["z"], |args| {
        Ok(out("z", json!(args["y"].as_i64().unwrap_or(0) + 1)))
    });
    let graph = Graph::new(vec![counted_square(&runs), add_one])?;
    let runner = Runner::new().with_cache(MemoryCache::new());

    let first = runner.run(&graph, inputs(&[("x", json!(3))])).await?;
    let second = runner.run(&graph, inputs(&[("x", json!(3))])).await?;

    // The cached value still flows through staleness detection downstream.
    assert_eq!(first.outputs["z"], json!(10));
    assert_eq!(second.outputs["z"], json!(10));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    Ok(())
}
