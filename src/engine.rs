//! Wiring of the store, coordinators and aggregator into one unit.
//!
//! An [`Engine`] is created once per process (or per test). Every graph it
//! opens shares its store, so two views over the same repository share
//! handles, in-flight requests and mutation results.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResourceStore;
use crate::config::ScopeConfig;
use crate::constants::{DEFAULT_MAX_AGE, DEFAULT_PRIORITY, DEFAULT_REQUEST_TIMEOUT};
use crate::coordinator::RequestCoordinator;
use crate::core::ResourceKey;
use crate::graph::{DependencyResolver, GraphContext, ObservationGraph};
use crate::handle::StalenessPolicy;
use crate::mutation::MutationCoordinator;
use crate::status::{StatusAggregator, StatusKind};
use crate::transport::Transport;

/// Tunables for an [`Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub max_age: Duration,
    pub request_timeout: Duration,
    pub priority: Vec<StatusKind>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            priority: DEFAULT_PRIORITY.to_vec(),
        }
    }
}

impl From<&ScopeConfig> for EngineOptions {
    fn from(config: &ScopeConfig) -> Self {
        Self {
            max_age: config.max_age(),
            request_timeout: config.request_timeout(),
            priority: config.priority.clone(),
        }
    }
}

/// Shared store plus the coordinators every graph is wired to.
#[derive(Clone)]
pub struct Engine {
    context: GraphContext,
}

impl Engine {
    /// Build an engine on `transport`.
    pub fn new(transport: Arc<dyn Transport>, options: EngineOptions) -> Self {
        let store = Arc::new(ResourceStore::new());
        let coordinator = RequestCoordinator::new(
            Arc::clone(&transport),
            StalenessPolicy::new(options.max_age),
        )
        .with_request_timeout(options.request_timeout);
        let mutations = MutationCoordinator::new(Arc::clone(&store), transport)
            .with_request_timeout(options.request_timeout);

        tracing::debug!(
            "Engine ready: max_age={:?}, timeout={:?}, priority={:?}",
            options.max_age,
            options.request_timeout,
            options.priority
        );
        Self {
            context: GraphContext {
                store,
                coordinator: Arc::new(coordinator),
                mutations: Arc::new(mutations),
                aggregator: StatusAggregator::new(options.priority),
            },
        }
    }

    /// Build an engine from loaded configuration.
    pub fn from_config(transport: Arc<dyn Transport>, config: &ScopeConfig) -> Self {
        Self::new(transport, EngineOptions::from(config))
    }

    /// Open a graph on `root`. Must be called from within a Tokio runtime.
    pub fn graph(&self, root: ResourceKey, resolver: DependencyResolver) -> ObservationGraph {
        ObservationGraph::open(root, resolver, &self.context)
    }

    /// The shared handle store.
    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.context.store
    }

    /// The request coordinator.
    pub fn coordinator(&self) -> &Arc<RequestCoordinator> {
        &self.context.coordinator
    }

    /// The mutation coordinator.
    pub fn mutations(&self) -> &Arc<MutationCoordinator> {
        &self.context.mutations
    }

    /// The services handed to every graph.
    pub fn context(&self) -> &GraphContext {
        &self.context
    }
}
