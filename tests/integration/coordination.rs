//! Request deduplication and completion delivery across many callers.

use futures::future::join_all;
use reposcope::coordinator::{Outcome, RequestCoordinator};
use reposcope::core::{ResourceKey, ScopeError};
use reposcope::engine::{Engine, EngineOptions};
use reposcope::handle::{ResourceHandle, StalenessPolicy};
use reposcope::repo::{RepoSlug, repository_resolver};
use reposcope::test_utils::{demo_transport, init_test_logging};
use reposcope::transport::MemoryTransport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn coordinator(transport: &Arc<MemoryTransport>, max_age: Duration) -> RequestCoordinator {
    RequestCoordinator::new(transport.clone(), StalenessPolicy::new(max_age))
}

/// N callers racing on an empty handle cause one request and N completions.
#[tokio::test]
async fn test_concurrent_loads_share_one_request() {
    init_test_logging(None);
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("repos/octo/demo", json!({"full_name": "octo/demo"}));
    transport.hold("repos/octo/demo");
    let coordinator = coordinator(&transport, Duration::from_secs(60));
    let handle = ResourceHandle::new(ResourceKey::new("repos/octo/demo"));

    let completions: Vec<_> = (0..8).map(|_| coordinator.ensure_loaded(&handle)).collect();
    assert!(handle.is_in_flight());
    transport.release("repos/octo/demo");

    let events = join_all(completions).await;
    assert_eq!(events.len(), 8);
    assert!(events.iter().all(|event| event.outcome() == Some(Outcome::Fetched)));
    assert_eq!(transport.fetch_count("repos/octo/demo"), 1);
    assert_eq!(handle.content().as_deref(), Some(&json!({"full_name": "octo/demo"})));
    assert!(!handle.is_in_flight());
}

/// A failed request completes every waiter exactly once with the same error.
#[tokio::test]
async fn test_failure_reaches_every_waiter_once() {
    let transport = Arc::new(MemoryTransport::new());
    transport.fail("repos/octo/demo", "HTTP 502: Bad Gateway");
    transport.hold("repos/octo/demo");
    let coordinator = coordinator(&transport, Duration::from_secs(60));
    let handle = ResourceHandle::new(ResourceKey::new("repos/octo/demo"));

    let completions: Vec<_> = (0..3).map(|_| coordinator.ensure_loaded(&handle)).collect();
    transport.release("repos/octo/demo");

    for event in join_all(completions).await {
        assert!(matches!(event.error(), Some(ScopeError::Transport { .. })));
    }
    assert_eq!(transport.fetch_count("repos/octo/demo"), 1);

    let state = handle.state();
    assert!(state.content.is_none());
    assert!(state.last_error.is_some());
    assert!(!state.in_flight);
}

/// Stale content stays visible when a revalidation fails, and the next
/// success clears the error.
#[tokio::test]
async fn test_error_keeps_stale_content() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("repos/octo/demo", json!({"stargazers_count": 1}));
    let coordinator = coordinator(&transport, Duration::ZERO);
    let handle = ResourceHandle::new(ResourceKey::new("repos/octo/demo"));

    assert!(coordinator.ensure_loaded(&handle).await.is_ok());

    transport.fail("repos/octo/demo", "connection reset");
    assert!(coordinator.ensure_loaded(&handle).await.error().is_some());
    let state = handle.state();
    assert_eq!(state.content.as_deref(), Some(&json!({"stargazers_count": 1})));
    assert!(state.last_error.is_some());

    transport.clear_failure("repos/octo/demo");
    transport.insert("repos/octo/demo", json!({"stargazers_count": 2}));
    assert!(coordinator.ensure_loaded(&handle).await.is_ok());
    let state = handle.state();
    assert_eq!(state.content.as_deref(), Some(&json!({"stargazers_count": 2})));
    assert!(state.last_error.is_none());
}

/// Repeated ensure_fresh calls within the window never reach the transport.
#[tokio::test(start_paused = true)]
async fn test_ensure_fresh_is_idempotent_within_max_age() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let options = EngineOptions {
        max_age: Duration::from_secs(60),
        ..EngineOptions::default()
    };
    let engine = Engine::new(transport.clone(), options);
    let slug: RepoSlug = "octo/demo".parse().unwrap();
    let graph = engine.graph(slug.root_key(), repository_resolver());

    assert!(graph.ensure_fresh().await.is_ok());
    let after_first = transport.total_fetches();
    assert_eq!(after_first, 4);

    for _ in 0..5 {
        let report = graph.ensure_fresh().await;
        assert_eq!(report.root.outcome(), Some(Outcome::Cached));
        assert!(report.derived.values().all(|event| event.outcome() == Some(Outcome::Cached)));
    }
    assert_eq!(transport.total_fetches(), after_first);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(graph.ensure_fresh().await.is_ok());
    assert_eq!(transport.total_fetches(), after_first * 2);

    graph.close().await;
}

/// An explicit refresh always issues a request.
#[tokio::test]
async fn test_refresh_ignores_max_age() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let slug: RepoSlug = "octo/demo".parse().unwrap();
    let graph = engine.graph(slug.root_key(), repository_resolver());

    graph.ensure_fresh().await;
    let report = graph.refresh().await;
    assert_eq!(report.root.outcome(), Some(Outcome::Fetched));
    assert_eq!(transport.fetch_count("repos/octo/demo"), 2);

    graph.close().await;
}
