//! reposcope - dependent-resource observation and coordinated mutation
//!
//! Given one root network-backed resource (a repository), reposcope derives
//! secondary resources from the root's content (contributors, languages,
//! starred state), keeps all of them fresh through a staleness policy, folds
//! their loading/error/data states into one prioritized status, and lets a
//! mutating action (starring) update local state once while every other
//! observer of the same data picks up the change.
//!
//! # Architecture Overview
//!
//! ```text
//!  ObservationGraph ──ensure_fresh──▶ RequestCoordinator ──fetch──▶ Transport
//!        │   ▲                              │
//!        │   └──── watch ◀── ResourceHandle ◀┘ (one per key, shared via ResourceStore)
//!        │                        ▲
//!        └──perform_mutation──▶ MutationCoordinator ──write──▶ Transport
//! ```
//!
//! - Handles are identity-keyed and shared: two graphs over the same key see
//!   the same handle, the same in-flight request and the same mutation results.
//! - "Load if needed" is cheap to call unconditionally: fresh content is served
//!   from cache and concurrent callers join one request.
//! - Every caller receives exactly one completion event, including when its
//!   graph is torn down mid-request.
//!
//! # Core Modules
//!
//! - [`handle`] - Shared per-resource state and the staleness policy
//! - [`coordinator`] - Request deduplication and single-fire completions
//! - [`graph`] - Observation graphs and derivation edges
//! - [`status`] - Prioritized status aggregation
//! - [`mutation`] - Coordinated writes with side effects
//! - [`cache`] - The process-wide, reference-counted handle store
//! - [`transport`] - The fetch/write primitive (HTTP and in-memory)
//!
//! ## Supporting Modules
//!
//! - [`engine`] - Wires the store and coordinators together
//! - [`repo`] - Repository keys, edges and the star mutation
//! - [`config`] - `~/.reposcope/config.toml`
//! - [`core`] - Keys and error types
//! - [`cli`] - The `reposcope` command line
//!
//! # Example
//!
//! ```rust,no_run
//! use reposcope::engine::{Engine, EngineOptions};
//! use reposcope::repo::{RepoSlug, repository_resolver, star_request};
//! use reposcope::transport::MemoryTransport;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Engine::new(Arc::new(MemoryTransport::new()), EngineOptions::default());
//! let slug: RepoSlug = "octo/demo".parse()?;
//!
//! let graph = engine.graph(slug.root_key(), repository_resolver());
//! graph.ensure_fresh().await;
//! println!("{:?}", graph.snapshot().status.display);
//!
//! let event = graph.perform_mutation(star_request(&slug, true)).await;
//! assert!(event.is_ok());
//! # Ok(())
//! # }
//! ```

// Core functionality modules
pub mod cache;
pub mod coordinator;
pub mod graph;
pub mod handle;
pub mod mutation;
pub mod status;
pub mod transport;

// Supporting modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod repo;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
