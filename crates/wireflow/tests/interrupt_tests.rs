//! Interrupt semantics: suspension, checkpointing, resume replay, resolver
//! functions and pre-provided responses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use wireflow::{
    interrupt_response_key, Error, Graph, MemoryCheckpointer, Node, RunStatus, Runner, Value,
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

/// compose(topic) -> draft, review interrupt on draft, publish(approved).
fn review_graph(compose_runs: &Arc<AtomicUsize>) -> Graph {
    let counter = Arc::clone(compose_runs);
    let compose = Node::function("compose", ["topic"], ["draft"], move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(out(
            "draft",
            json!(format!("draft about {}", args["topic"].as_str().unwrap_or("?"))),
        ))
    });
    let review = Node::interrupt("review", "draft", "approved");
    let publish = Node::function("publish", ["approved"], ["published"], |args| {
        Ok(out("published", args["approved"].clone()))
    });
    Graph::new(vec![compose, publish, review]).unwrap()
}

#[tokio::test]
async fn test_unresolved_interrupt_suspends_with_descriptor() -> Result<(), Error> {
    common::init_tracing();
    let compose_runs = Arc::new(AtomicUsize::new(0));
    let graph = review_graph(&compose_runs);

    let result = Runner::new()
        .run(&graph, inputs(&[("topic", json!("cats"))]))
        .await?;

    assert_eq!(result.status, RunStatus::Suspended);
    let interrupt = result.interrupt.as_ref().unwrap();
    assert_eq!(interrupt.node, "review");
    assert_eq!(interrupt.value, json!("draft about cats"));
    assert_eq!(interrupt.response_key, "review.response");
    assert_eq!(interrupt.response_key, interrupt_response_key("review"));

    // Upstream work is visible, downstream never ran.
    assert_eq!(result.outputs["draft"], json!("draft about cats"));
    assert!(!result.outputs.contains_key("published"));
    // The snapshot records per-scope, per-node input versions; compose's
    // consumed inputs sit under the top-level scope.
    let checkpoint = result.checkpoint.as_ref().unwrap();
    assert!(checkpoint.seen_versions["graph"]["compose"].contains_key("topic"));
    Ok(())
}

#[tokio::test]
async fn test_resume_injects_response_without_replaying_upstream() -> Result<(), Error> {
    let compose_runs = Arc::new(AtomicUsize::new(0));
    let graph = review_graph(&compose_runs);
    let runner = Runner::new();

    let suspended = runner
        .run(&graph, inputs(&[("topic", json!("cats"))]))
        .await?;
    let checkpoint = suspended.checkpoint.unwrap();
    let key = suspended.interrupt.unwrap().response_key;

    let resumed = runner
        .resume(&graph, checkpoint, [(key, json!("edited draft"))].into())
        .await?;

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.run_id, suspended.run_id);
    assert_eq!(resumed.outputs["approved"], json!("edited draft"));
    assert_eq!(resumed.outputs["published"], json!("edited draft"));
    // compose ran exactly once across both segments.
    assert_eq!(compose_runs.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_resume_without_response_suspends_again() -> Result<(), Error> {
    let compose_runs = Arc::new(AtomicUsize::new(0));
    let graph = review_graph(&compose_runs);
    let runner = Runner::new();

    let first = runner
        .run(&graph, inputs(&[("topic", json!("cats"))]))
        .await?;
    let second = runner
        .resume(&graph, first.checkpoint.unwrap(), ValueMap::new())
        .await?;

    assert_eq!(second.status, RunStatus::Suspended);
    let interrupt = second.interrupt.unwrap();
    assert_eq!(interrupt.node, "review");
    assert_eq!(interrupt.value, json!("draft about cats"));
    assert_eq!(compose_runs.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_resolver_avoids_suspension() -> Result<(), Error> {
    let compose = Node::function("compose", ["topic"], ["draft"], |args| {
        Ok(out("draft", args["topic"].clone()))
    });
    let review = Node::interrupt("review", "draft", "approved").with_resolver(|draft| {
        Ok(Some(json!(format!(
            "auto-approved: {}",
            draft.as_str().unwrap_or("?")
        ))))
    });
    let publish = Node::function("publish", ["approved"], ["published"], |args| {
        Ok(out("published", args["approved"].clone()))
    });

    let graph = Graph::new(vec![compose, review, publish])?;
    let result = Runner::new()
        .run(&graph, inputs(&[("topic", json!("cats"))]))
        .await?;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.outputs["published"], json!("auto-approved: cats"));
    Ok(())
}

#[tokio::test]
async fn test_preprovided_response_replays_without_suspension() -> Result<(), Error> {
    let compose_runs = Arc::new(AtomicUsize::new(0));
    let graph = review_graph(&compose_runs);

    // Supplying the response up front replays the interaction headlessly.
    let result = Runner::new()
        .run(
            &graph,
            inputs(&[
                ("topic", json!("cats")),
                ("review.response", json!("looks good")),
            ]),
        )
        .await?;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.outputs["published"], json!("looks good"));
    Ok(())
}

#[tokio::test]
async fn test_resolver_error_fails_the_run() {
    let compose = Node::function("compose", ["topic"], ["draft"], |args| {
        Ok(out("draft", args["topic"].clone()))
    });
    let review = Node::interrupt("review", "draft", "approved")
        .with_resolver(|_| Err(Error::msg("reviewer unavailable")));

    let graph = Graph::new(vec![compose, review]).unwrap();
    let err = Runner::new()
        .run(&graph, inputs(&[("topic", json!("cats"))]))
        .await
        .unwrap_err();
    match err {
        Error::NodeExecution { node, source } => {
            assert_eq!(node, "review");
            assert!(source.to_string().contains("reviewer unavailable"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_checkpointer_persists_and_clears_suspensions() -> Result<(), Error> {
    let compose_runs = Arc::new(AtomicUsize::new(0));
    let graph = review_graph(&compose_runs);
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let runner = Runner::new().with_checkpointer(Arc::clone(&checkpointer));

    let suspended = runner
        .run(&graph, inputs(&[("topic", json!("cats"))]))
        .await?;
    assert_eq!(checkpointer.len(), 1);

    // A separate process could reload the checkpoint by run id.
    use wireflow::Checkpointer;
    let stored = checkpointer.load(&suspended.run_id)?;
    assert_eq!(stored.pending_interrupt.as_ref().unwrap().node, "review");

    let key = suspended.interrupt.unwrap().response_key;
    runner
        .resume(&graph, stored, [(key, json!("ok"))].into())
        .await?;
    assert!(checkpointer.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_sync_rejects_interrupt_graphs() {
    let compose_runs = Arc::new(AtomicUsize::new(0));
    let graph = review_graph(&compose_runs);
    let err = Runner::new()
        .run_sync(&graph, inputs(&[("topic", json!("cats"))]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::IncompatibleGraph {
            operation: "run_sync",
            ..
        }
    ));
}
