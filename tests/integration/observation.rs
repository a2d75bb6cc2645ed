//! Observation graphs sharing handles, reacting to root changes and
//! tearing down cleanly.

use futures::future::join;
use reposcope::core::{ResourceKey, ScopeError};
use reposcope::engine::{Engine, EngineOptions};
use reposcope::graph::{DependencyResolver, DerivationEdge, EdgeId};
use reposcope::repo::{CONTRIBUTORS, LANGUAGES, RepoSlug, STARRED, repository_resolver};
use reposcope::test_utils::{demo_transport, repo_json};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn slug() -> RepoSlug {
    "octo/demo".parse().unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Two edges that resolve to the same key share one handle and one request.
#[tokio::test]
async fn test_edges_resolving_to_one_key_share_a_request() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.hold("repos/octo/demo/languages");
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let languages = ResourceKey::new("repos/octo/demo/languages");
    let resolver = DependencyResolver::new()
        .with_edge(DerivationEdge::new("languages", |_| {
            Some(ResourceKey::new("repos/octo/demo/languages"))
        }))
        .with_edge(DerivationEdge::new("language-chart", |_| {
            Some(ResourceKey::new("repos/octo/demo/languages"))
        }));
    let graph = engine.graph(slug().root_key(), resolver);

    let report = tokio::spawn(graph.ensure_fresh());
    wait_until(|| engine.store().get(&languages).is_some_and(|h| h.is_in_flight())).await;
    assert_eq!(engine.store().ref_count(&languages), 1);

    transport.release("repos/octo/demo/languages");
    let report = report.await.unwrap();
    assert!(report.is_ok());
    assert_eq!(transport.fetch_count("repos/octo/demo/languages"), 1);
    assert_eq!(report.derived.len(), 2);
    assert!(report.derived.contains_key(&EdgeId::new("languages")));
    assert!(report.derived.contains_key(&EdgeId::new("language-chart")));

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.derived_content("languages"), Some(&json!({"Rust": 7500, "Shell": 2500})));
    assert_eq!(snapshot.derived_content("language-chart"), snapshot.derived_content("languages"));
    assert_eq!(engine.store().ref_count(&languages), 1);

    graph.close().await;
}

/// Two graphs over the same repository share every handle and every request.
#[tokio::test]
async fn test_graphs_share_handles() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.hold("repos/octo/demo");
    let engine = Engine::new(transport.clone(), EngineOptions::default());

    let first = engine.graph(slug().root_key(), repository_resolver());
    let second = engine.graph(slug().root_key(), repository_resolver());
    let both = join(first.ensure_fresh(), second.ensure_fresh());
    let release = async {
        wait_until(|| {
            engine.store().get(&slug().root_key()).is_some_and(|h| h.is_in_flight())
        })
        .await;
        transport.release("repos/octo/demo");
    };
    let ((first_report, second_report), ()) = join(both, release).await;

    assert!(first_report.is_ok());
    assert!(second_report.is_ok());
    assert_eq!(transport.fetch_count("repos/octo/demo"), 1);
    assert_eq!(transport.fetch_count("repos/octo/demo/languages"), 1);
    assert_eq!(engine.store().ref_count(&slug().root_key()), 2);
    assert_eq!(first.snapshot(), second.snapshot());

    first.close().await;
    assert_eq!(engine.store().ref_count(&slug().root_key()), 1);
    second.close().await;
    assert!(engine.store().referenced().is_empty());
}

/// Closing one graph mid-request cancels only its own completion.
#[tokio::test]
async fn test_close_mid_request_cancels_only_that_graph() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.hold("repos/octo/demo");
    let engine = Engine::new(transport.clone(), EngineOptions::default());

    let closing = engine.graph(slug().root_key(), repository_resolver());
    let surviving = engine.graph(slug().root_key(), repository_resolver());
    let closing_report = tokio::spawn(closing.ensure_fresh());
    let surviving_report = tokio::spawn(surviving.ensure_fresh());

    wait_until(|| engine.store().get(&slug().root_key()).is_some_and(|h| h.is_in_flight())).await;
    closing.close().await;
    transport.release("repos/octo/demo");

    let closed = closing_report.await.unwrap();
    assert!(closed.is_cancelled());

    let report = surviving_report.await.unwrap();
    assert!(report.is_ok(), "{report:?}");
    assert_eq!(transport.fetch_count("repos/octo/demo"), 1);
    assert_eq!(stars(&surviving), Some(10));

    surviving.close().await;
}

/// When the root disappears, derived handles are released and surface as `None`.
#[tokio::test]
async fn test_absent_root_drops_derived() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());

    graph.ensure_fresh().await;
    let snapshot = graph.snapshot();
    assert!(snapshot.derived_content(LANGUAGES).is_some());
    assert!(snapshot.derived_content(CONTRIBUTORS).is_some());
    assert_eq!(engine.store().referenced().len(), 4);

    transport.remove("repos/octo/demo");
    let report = graph.refresh().await;
    assert!(report.is_ok());
    assert!(report.derived.is_empty());

    let snapshot = graph.snapshot();
    assert!(snapshot.root_content().is_none());
    for edge in [CONTRIBUTORS, LANGUAGES, STARRED] {
        assert!(snapshot.derived(edge).is_none(), "{edge} still attached");
    }
    assert!(!snapshot.status.has_any_data);
    assert_eq!(engine.store().referenced(), vec![slug().root_key()]);

    graph.close().await;
}

/// A changed derivation key swaps the subscription to the new handle.
#[tokio::test]
async fn test_changed_edge_key_replaces_subscription() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());
    graph.ensure_fresh().await;

    let old_languages = ResourceKey::new("repos/octo/demo/languages");
    let new_languages = ResourceKey::new("repos/octo/renamed/languages");
    let mut root = repo_json("octo", "demo", 10);
    root["languages_url"] = json!("https://api.github.com/repos/octo/renamed/languages");
    transport.insert("repos/octo/demo", root);
    transport.insert(new_languages.clone(), json!({"Go": 100}));

    graph.refresh().await;
    let snapshot = graph.snapshot();
    let languages = snapshot.derived(LANGUAGES).unwrap();
    assert_eq!(languages.key, new_languages);
    assert_eq!(languages.content(), Some(&json!({"Go": 100})));
    assert_eq!(engine.store().ref_count(&old_languages), 0);
    assert_eq!(engine.store().ref_count(&new_languages), 1);

    // The released handle stays cached until purged
    assert!(engine.store().get(&old_languages).is_some());
    assert!(engine.store().purge_unreferenced() >= 1);
    assert!(engine.store().get(&old_languages).is_none());

    graph.close().await;
}

/// A failing derived resource does not hide the others.
#[tokio::test]
async fn test_derived_failure_is_reported() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    transport.fail("repos/octo/demo/contributors", "HTTP 500: boom");
    let engine = Engine::new(transport.clone(), EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());

    let report = graph.ensure_fresh().await;
    assert!(!report.is_ok());
    assert!(report.root.is_ok());
    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        ScopeError::Transport { key, .. } if key.as_str() == "repos/octo/demo/contributors"
    ));

    let snapshot = graph.snapshot();
    assert!(snapshot.derived_content(LANGUAGES).is_some());
    assert!(snapshot.derived(CONTRIBUTORS).unwrap().state.last_error.is_some());

    graph.close().await;
}

/// Dropping a graph without closing it still releases its leases.
#[tokio::test]
async fn test_dropped_graph_releases_leases() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport, EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());
    graph.ensure_fresh().await;
    assert!(!engine.store().referenced().is_empty());

    drop(graph);
    wait_until(|| engine.store().referenced().is_empty()).await;
}

/// Snapshots arrive on the watch channel as handles change.
#[tokio::test]
async fn test_observe_sees_root_content() {
    let transport = Arc::new(demo_transport("octo", "demo", 10));
    let engine = Engine::new(transport, EngineOptions::default());
    let graph = engine.graph(slug().root_key(), repository_resolver());
    let mut snapshots = graph.observe();
    assert!(snapshots.borrow_and_update().root_content().is_none());

    let report = tokio::spawn(graph.ensure_fresh());
    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| snapshot.root_content().is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(snapshot.root_content().unwrap()["full_name"], "octo/demo");

    assert!(report.await.unwrap().is_ok());
    graph.close().await;
}

fn stars(graph: &reposcope::graph::ObservationGraph) -> Option<u64> {
    reposcope::repo::stargazers(graph.snapshot().root_content())
}
