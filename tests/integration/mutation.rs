//! Starring a repository and the ripple through every observer.

use reposcope::coordinator::Outcome;
use reposcope::core::ScopeError;
use reposcope::engine::{Engine, EngineOptions};
use reposcope::graph::ObservationGraph;
use reposcope::mutation::{MutationMode, MutationRequest};
use reposcope::repo::{RepoSlug, STARRED, is_starred, repository_resolver, star_request, stargazers};
use reposcope::test_utils::demo_transport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn slug() -> RepoSlug {
    "octo/demo".parse().unwrap()
}

fn stars(graph: &ObservationGraph) -> Option<u64> {
    stargazers(graph.snapshot().root_content())
}

fn starred(graph: &ObservationGraph) -> bool {
    is_starred(graph.snapshot().derived_content(STARRED))
}

/// The server's count lands in the root and the starred state flips, with
/// no refetch.
#[tokio::test]
async fn test_star_uses_server_count_without_refetch() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.set_write_response("user/starred/octo/demo", json!({"stargazers_count": 11}));
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());

    graph.ensure_fresh().await;
    assert_eq!(stars(&graph), Some(10));
    assert!(!starred(&graph));
    let fetches = transport.fetch_count("repos/octo/demo");

    let event = graph.perform_mutation(star_request(&slug(), true)).await;
    assert_eq!(event.outcome(), Some(Outcome::Written));
    assert_eq!(transport.write_count("user/starred/octo/demo"), 1);

    // Written content is fresh, so this only republishes
    graph.ensure_fresh().await;
    assert_eq!(stars(&graph), Some(11));
    assert!(starred(&graph));
    assert_eq!(transport.fetch_count("repos/octo/demo"), fetches);
    assert_eq!(transport.fetch_count("user/starred/octo/demo"), 1);

    graph.close().await;
}

/// Without a count in the response the root is adjusted locally, and a
/// second graph over the same repository sees the change too.
#[tokio::test]
async fn test_star_ripples_to_other_graphs() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let detail = engine.graph(slug().root_key(), repository_resolver());
    let list_row = engine.graph(slug().root_key(), repository_resolver());
    detail.ensure_fresh().await;
    list_row.ensure_fresh().await;

    let event = detail.perform_mutation(star_request(&slug(), true)).await;
    assert!(event.is_ok());

    let mut snapshots = list_row.observe();
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| {
            stargazers(snapshot.root_content()) == Some(11)
                && is_starred(snapshot.derived_content(STARRED))
        }),
    )
    .await
    .unwrap()
    .unwrap();

    // Unstarring restores the count
    let event = list_row.perform_mutation(star_request(&slug(), false)).await;
    assert!(event.is_ok());
    detail.ensure_fresh().await;
    assert_eq!(stars(&detail), Some(10));
    assert!(!starred(&detail));

    detail.close().await;
    list_row.close().await;
}

/// Not-starred is cached content, so unstarring leaves nothing to refetch.
#[tokio::test]
async fn test_unstar_keeps_starred_state_fresh() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());
    graph.ensure_fresh().await;
    assert_eq!(transport.fetch_count("user/starred/octo/demo"), 1);

    assert!(graph.perform_mutation(star_request(&slug(), true)).await.is_ok());
    assert!(graph.perform_mutation(star_request(&slug(), false)).await.is_ok());
    assert_eq!(transport.write_count("user/starred/octo/demo"), 2);

    let report = graph.ensure_fresh().await;
    assert!(report.derived.values().all(|event| event.outcome() == Some(Outcome::Cached)));
    assert!(!starred(&graph));
    assert_eq!(graph.snapshot().derived_content(STARRED), Some(&json!(false)));
    assert_eq!(transport.fetch_count("user/starred/octo/demo"), 1);

    graph.close().await;
}

/// Starring an already starred repository does not double count.
#[tokio::test]
async fn test_repeated_star_is_not_double_counted() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.insert("user/starred/octo/demo", json!(true));
    let engine = Engine::new(transport, EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());
    graph.ensure_fresh().await;
    assert!(starred(&graph));

    assert!(graph.perform_mutation(star_request(&slug(), true)).await.is_ok());
    graph.ensure_fresh().await;
    assert_eq!(stars(&graph), Some(10));

    graph.close().await;
}

/// A second write to the same key while one is pending is rejected.
#[tokio::test]
async fn test_concurrent_mutation_is_busy() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.hold("user/starred/octo/demo");
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());

    let first = graph.perform_mutation(star_request(&slug(), true));
    let second = graph.perform_mutation(star_request(&slug(), true)).await;
    assert!(matches!(second.error(), Some(ScopeError::Busy { .. })));

    transport.release("user/starred/octo/demo");
    assert!(first.await.is_ok());
    assert_eq!(transport.write_count("user/starred/octo/demo"), 1);

    graph.close().await;
}

/// An optimistic star shows immediately and is rolled back on failure.
#[tokio::test]
async fn test_optimistic_star_rolls_back() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.fail_writes("user/starred/octo/demo", "HTTP 403: Forbidden");
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());
    graph.ensure_fresh().await;
    transport.hold("user/starred/octo/demo");

    let request = star_request(&slug(), true).with_mode(MutationMode::Optimistic);
    let completion = graph.perform_mutation(request);
    let handle = engine.store().get(&slug().starred_key()).unwrap();
    assert_eq!(handle.content().as_deref(), Some(&json!(true)));
    assert!(handle.state().mutating);

    transport.release("user/starred/octo/demo");
    let event = completion.await;
    assert!(matches!(event.error(), Some(ScopeError::Transport { .. })));

    let state = handle.state();
    assert_eq!(state.content.as_deref(), Some(&json!(false)));
    assert!(state.last_error.is_some());
    assert!(!state.mutating);
    // Effects only run on success
    let root = engine.store().get(&slug().root_key()).unwrap();
    assert_eq!(stargazers(root.content().as_deref()), Some(10));

    graph.close().await;
}

/// Mutating a key nobody observes still stores the result for later readers.
#[tokio::test]
async fn test_mutation_without_observers() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport.clone(), EngineOptions::default());

    let request = MutationRequest::new(slug().starred_key(), json!(true)).with_payload(json!({}));
    assert!(engine.mutations().mutate(request).await.is_ok());

    let graph = engine.graph(slug().root_key(), repository_resolver());
    graph.ensure_fresh().await;
    assert!(starred(&graph));
    assert_eq!(transport.fetch_count("user/starred/octo/demo"), 0);

    graph.close().await;
}
