//! Prioritized status over a whole graph.

use reposcope::engine::{Engine, EngineOptions};
use reposcope::repo::{RepoSlug, repository_resolver};
use reposcope::status::StatusKind;
use reposcope::test_utils::demo_transport;
use std::sync::Arc;
use std::time::Duration;

fn slug() -> RepoSlug {
    "octo/demo".parse().unwrap()
}

/// Partial data wins over an in-flight load and a failed one under the
/// default priority.
#[tokio::test]
async fn test_partial_data_beats_loading_and_error() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.fail("repos/octo/demo/contributors", "HTTP 500: boom");
    transport.hold("repos/octo/demo/languages");
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());

    let report = tokio::spawn(graph.ensure_fresh());
    let mut snapshots = graph.observe();
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| {
            snapshot.status.loading
                && snapshot.status.error.is_some()
                && snapshot.status.has_any_data
        }),
    )
    .await
    .unwrap()
    .unwrap()
    .status
    .clone();
    assert_eq!(status.display, Some(StatusKind::AnyData));

    transport.release("repos/octo/demo/languages");
    report.await.unwrap();
    let status = graph.snapshot().status;
    assert!(!status.loading);
    assert_eq!(status.display, Some(StatusKind::AnyData));

    graph.close().await;
}

/// A configured priority reorders the displayed kind without changing the flags.
#[tokio::test]
async fn test_error_first_priority() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.fail("repos/octo/demo/languages", "HTTP 500: boom");
    let options = EngineOptions {
        priority: vec![StatusKind::Error, StatusKind::AnyData, StatusKind::Loading],
        ..EngineOptions::default()
    };
    let engine = Engine::new(transport, options);
    let graph = engine.graph(slug().root_key(), repository_resolver());

    graph.ensure_fresh().await;
    let status = graph.snapshot().status;
    assert_eq!(status.display, Some(StatusKind::Error));
    assert!(status.has_any_data);
    assert!(!status.loading);

    graph.close().await;
}

/// A root-only failure with nothing cached displays the error.
#[tokio::test]
async fn test_root_failure_without_data() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.fail("repos/octo/demo", "HTTP 503: unavailable");
    let engine = Engine::new(transport, EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());

    let report = graph.ensure_fresh().await;
    assert!(report.root.error().is_some());
    let status = graph.snapshot().status;
    assert_eq!(status.display, Some(StatusKind::Error));
    assert!(!status.has_any_data);

    graph.close().await;
}
