//! Observation graphs: one root resource plus the resources derived from it.
//!
//! An [`ObservationGraph`] is what a view holds for one session. It leases the
//! root handle from the shared [`ResourceStore`], evaluates its
//! [`DependencyResolver`] whenever the root's content changes, and keeps one
//! lease and one subscription per distinct derived key. Every change to any of
//! those handles produces a new [`GraphSnapshot`] on a `watch` channel, with
//! the [`AggregateStatus`] already computed.
//!
//! # Driver Task
//!
//! Each graph is driven by a single Tokio task that owns all of its mutable
//! state. The public handle talks to it over an mpsc command channel:
//!
//! ```text
//!  ensure_fresh ──▶ Command ──▶ driver ──load root──▶ RootSettled
//!                                  │                      │ reconcile edges
//!                                  │                      ▼
//!                                  │            load every derived key
//!                                  │                      │
//!                                  └──── publish ◀── Finished ──▶ FreshReport
//! ```
//!
//! Handle changes reach the driver through their `watch` receivers, so writes
//! made by a mutation, or by another graph's fetch of a shared key, show up
//! without the graph being told about them.
//!
//! Dropping or closing the graph ends the driver. Teardown detaches this
//! graph's waiters (they complete with `Cancelled`) and releases its leases;
//! shared requests keep running for any other graph.

pub mod resolver;

pub use resolver::{DependencyResolver, DerivationEdge, EdgeChange, EdgeId, Resolution};

use futures::future::{BoxFuture, join_all, select_all};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::cache::{HandleLease, ResourceStore};
use crate::constants::GRAPH_COMMAND_BUFFER;
use crate::coordinator::{Completion, CompletionEvent, LoadMode, RequestCoordinator};
use crate::core::{GraphId, ResourceKey, ScopeError};
use crate::handle::HandleState;
use crate::mutation::{MutationCoordinator, MutationRequest};
use crate::status::{AggregateStatus, StatusAggregator};

/// Shared services every graph of an engine is wired to.
#[derive(Clone)]
pub struct GraphContext {
    /// Process-wide handle store
    pub store: Arc<ResourceStore>,
    /// Fetch deduplication and staleness gating
    pub coordinator: Arc<RequestCoordinator>,
    /// Coordinated writes
    pub mutations: Arc<MutationCoordinator>,
    /// Status priority for snapshots
    pub aggregator: StatusAggregator,
}

/// One handle's key and state at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleView {
    pub key: ResourceKey,
    pub state: HandleState,
}

impl HandleView {
    /// The handle's content, if any.
    pub fn content(&self) -> Option<&Value> {
        self.state.content.as_deref()
    }
}

/// Everything a view needs to render one graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    /// Prioritized status over the root and every distinct derived handle
    pub status: AggregateStatus,
    /// The root resource
    pub root: HandleView,
    /// Per edge, the derived handle, or `None` when the edge yields no key
    pub derived: BTreeMap<EdgeId, Option<HandleView>>,
}

impl GraphSnapshot {
    fn empty(root: ResourceKey) -> Self {
        Self {
            status: AggregateStatus::default(),
            root: HandleView {
                key: root,
                state: HandleState::default(),
            },
            derived: BTreeMap::new(),
        }
    }

    /// The derived handle for `edge`, if the edge currently yields a key.
    pub fn derived(&self, edge: &str) -> Option<&HandleView> {
        self.derived.get(&EdgeId::new(edge)).and_then(Option::as_ref)
    }

    /// Content of the derived handle for `edge`.
    pub fn derived_content(&self, edge: &str) -> Option<&Value> {
        self.derived(edge).and_then(HandleView::content)
    }

    /// Content of the root handle.
    pub fn root_content(&self) -> Option<&Value> {
        self.root.content()
    }
}

/// Per-handle results of one [`ObservationGraph::ensure_fresh`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FreshReport {
    /// Completion of the root load
    pub root: CompletionEvent,
    /// Completion per edge that yielded a key after the root settled
    pub derived: BTreeMap<EdgeId, CompletionEvent>,
}

impl FreshReport {
    fn cancelled(root: ResourceKey) -> Self {
        Self {
            root: CompletionEvent::cancelled(root),
            derived: BTreeMap::new(),
        }
    }

    /// Whether the root and every derived load succeeded.
    pub fn is_ok(&self) -> bool {
        self.root.is_ok() && self.derived.values().all(CompletionEvent::is_ok)
    }

    /// Whether the graph went away before the root load settled.
    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Every error in the report, root first.
    pub fn errors(&self) -> impl Iterator<Item = &ScopeError> {
        std::iter::once(&self.root)
            .chain(self.derived.values())
            .filter_map(CompletionEvent::error)
    }
}

enum Command {
    EnsureFresh {
        mode: LoadMode,
        reply: oneshot::Sender<FreshReport>,
    },
    Close,
}

enum Step {
    RootSettled {
        mode: LoadMode,
        root: CompletionEvent,
        reply: oneshot::Sender<FreshReport>,
    },
    Finished {
        report: FreshReport,
        reply: oneshot::Sender<FreshReport>,
    },
}

enum Wake {
    Command(Option<Command>),
    Step(Step),
    Changed,
}

struct Attached {
    lease: HandleLease,
    rx: watch::Receiver<HandleState>,
}

/// A root resource, its derived resources and their combined status.
///
/// Must be created from within a Tokio runtime.
pub struct ObservationGraph {
    id: GraphId,
    root: ResourceKey,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<GraphSnapshot>,
    mutations: Arc<MutationCoordinator>,
    driver: JoinHandle<()>,
}

impl ObservationGraph {
    /// Open a graph on `root`, deriving secondary keys with `resolver`.
    ///
    /// Cached content is published immediately; nothing is fetched for the
    /// root until [`ensure_fresh`](Self::ensure_fresh) is called.
    pub fn open(root: ResourceKey, resolver: DependencyResolver, context: &GraphContext) -> Self {
        let id = GraphId::new();
        let lease = context.store.acquire(&root);
        let root_rx = lease.subscribe();
        let (snapshot_tx, snapshots) = watch::channel(GraphSnapshot::empty(root.clone()));

        let mut driver = Driver {
            id,
            root: lease,
            root_rx,
            resolver,
            resolution: Resolution::new(),
            attached: BTreeMap::new(),
            store: Arc::clone(&context.store),
            coordinator: Arc::clone(&context.coordinator),
            aggregator: context.aggregator.clone(),
            snapshots: snapshot_tx,
        };
        driver.reconcile();
        driver.publish();

        tracing::debug!(target: "graph", "[{id}] Opened graph on {root}");
        let (commands, rx) = mpsc::channel(GRAPH_COMMAND_BUFFER);
        let driver = tokio::spawn(driver.run(rx));

        Self {
            id,
            root,
            commands,
            snapshots,
            mutations: Arc::clone(&context.mutations),
            driver,
        }
    }

    /// This graph's identity.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// The root key.
    pub fn root(&self) -> &ResourceKey {
        &self.root
    }

    /// Subscribe to snapshots. The receiver starts at the latest snapshot.
    pub fn observe(&self) -> watch::Receiver<GraphSnapshot> {
        self.snapshots.clone()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Load the root, then every derived resource, each only if stale.
    ///
    /// Safe to call on every visibility event: within the staleness window it
    /// completes from cache without touching the transport. The returned
    /// future does not borrow the graph.
    pub fn ensure_fresh(&self) -> BoxFuture<'static, FreshReport> {
        self.request(LoadMode::IfStale)
    }

    /// Like [`ensure_fresh`](Self::ensure_fresh) but ignores the staleness window.
    pub fn refresh(&self) -> BoxFuture<'static, FreshReport> {
        self.request(LoadMode::Force)
    }

    /// Perform a coordinated write. See [`MutationCoordinator::mutate`].
    pub fn perform_mutation(&self, request: MutationRequest) -> Completion {
        self.mutations.mutate(request)
    }

    /// Stop the driver and wait for its teardown.
    pub async fn close(self) {
        // A closed channel means the driver is already gone
        let _ = self.commands.send(Command::Close).await;
        if let Err(error) = self.driver.await {
            tracing::warn!(target: "graph", "[{}] Graph driver failed: {error}", self.id);
        }
    }

    fn request(&self, mode: LoadMode) -> BoxFuture<'static, FreshReport> {
        let (reply, rx) = oneshot::channel();
        let root = self.root.clone();

        // Queue now so the command is ordered before any later close
        let backlog = match self.commands.try_send(Command::EnsureFresh { mode, reply }) {
            Ok(()) => None,
            Err(TrySendError::Full(command)) => Some((self.commands.clone(), command)),
            Err(TrySendError::Closed(_)) => {
                return async move { FreshReport::cancelled(root) }.boxed();
            }
        };

        async move {
            if let Some((commands, command)) = backlog {
                if commands.send(command).await.is_err() {
                    return FreshReport::cancelled(root);
                }
            }
            rx.await.unwrap_or_else(|_| FreshReport::cancelled(root))
        }
        .boxed()
    }
}

impl std::fmt::Debug for ObservationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationGraph")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

struct Driver {
    id: GraphId,
    root: HandleLease,
    root_rx: watch::Receiver<HandleState>,
    resolver: DependencyResolver,
    resolution: Resolution,
    attached: BTreeMap<ResourceKey, Attached>,
    store: Arc<ResourceStore>,
    coordinator: Arc<RequestCoordinator>,
    aggregator: StatusAggregator,
    snapshots: watch::Sender<GraphSnapshot>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut pending: FuturesUnordered<BoxFuture<'static, Step>> = FuturesUnordered::new();

        loop {
            let wake =
                next_wake(&mut commands, &mut pending, &mut self.root_rx, &mut self.attached).await;
            match wake {
                Wake::Command(Some(Command::EnsureFresh { mode, reply })) => {
                    pending.push(self.load_root(mode, reply));
                }
                Wake::Command(Some(Command::Close) | None) => break,
                Wake::Step(step) => {
                    if let Some(next) = self.advance(step) {
                        pending.push(next);
                    }
                }
                Wake::Changed => {
                    self.reconcile();
                    self.publish();
                }
            }
        }

        drop(pending);
        self.teardown();
    }

    fn load_root(
        &self,
        mode: LoadMode,
        reply: oneshot::Sender<FreshReport>,
    ) -> BoxFuture<'static, Step> {
        let completion = self.coordinator.load(&self.root, Some(self.id), mode);
        async move {
            Step::RootSettled {
                mode,
                root: completion.await,
                reply,
            }
        }
        .boxed()
    }

    fn advance(&mut self, step: Step) -> Option<BoxFuture<'static, Step>> {
        match step {
            Step::RootSettled { mode, root, reply } => {
                self.reconcile();
                self.publish();

                let edges: Vec<(EdgeId, ResourceKey)> = self
                    .resolution
                    .iter()
                    .filter_map(|(edge, key)| key.clone().map(|key| (edge.clone(), key)))
                    .collect();
                let loads: Vec<_> = self
                    .attached
                    .iter()
                    .map(|(key, attached)| {
                        let key = key.clone();
                        let completion =
                            self.coordinator.load(&attached.lease, Some(self.id), mode);
                        async move { (key, completion.await) }
                    })
                    .collect();

                Some(
                    async move {
                        let events: BTreeMap<_, _> = join_all(loads).await.into_iter().collect();
                        let derived = edges
                            .into_iter()
                            .filter_map(|(edge, key)| {
                                events.get(&key).cloned().map(|event| (edge, event))
                            })
                            .collect();
                        Step::Finished {
                            report: FreshReport { root, derived },
                            reply,
                        }
                    }
                    .boxed(),
                )
            }
            Step::Finished { report, reply } => {
                self.reconcile();
                self.publish();
                // The caller may have stopped waiting
                let _ = reply.send(report);
                None
            }
        }
    }

    /// Re-resolve edges against the root's current content and attach or
    /// detach derived handles to match.
    fn reconcile(&mut self) {
        let content = self.root.content();
        let resolution = self.resolver.resolve(content.as_deref());
        if resolution == self.resolution {
            return;
        }

        for (edge, change) in resolver::diff(&self.resolution, &resolution) {
            tracing::debug!(target: "graph", "[{}] Edge {edge}: {change:?}", self.id);
        }

        let wanted: BTreeSet<&ResourceKey> = resolution.values().flatten().collect();
        let stale: Vec<ResourceKey> =
            self.attached.keys().filter(|key| !wanted.contains(key)).cloned().collect();
        for key in stale {
            if let Some(attached) = self.attached.remove(&key) {
                attached.lease.detach(self.id);
                tracing::trace!(target: "graph", "[{}] Released {key}", self.id);
            }
        }

        for key in wanted {
            if self.attached.contains_key(key) {
                continue;
            }
            let lease = self.store.acquire(key);
            let rx = lease.subscribe();
            // The completion is not needed; changes arrive through `rx`
            let _ = self.coordinator.load(&lease, Some(self.id), LoadMode::IfStale);
            self.attached.insert(key.clone(), Attached { lease, rx });
        }

        self.resolution = resolution;
    }

    fn publish(&mut self) {
        let root_state = self.root_rx.borrow_and_update().clone();
        let states: BTreeMap<ResourceKey, HandleState> = self
            .attached
            .iter_mut()
            .map(|(key, attached)| (key.clone(), attached.rx.borrow_and_update().clone()))
            .collect();

        let derived = self
            .resolution
            .iter()
            .map(|(edge, key)| {
                let view = key.as_ref().and_then(|key| {
                    states.get(key).map(|state| HandleView {
                        key: key.clone(),
                        state: state.clone(),
                    })
                });
                (edge.clone(), view)
            })
            .collect();
        let status = self.aggregator.aggregate(std::iter::once(&root_state).chain(states.values()));

        let snapshot = GraphSnapshot {
            status,
            root: HandleView {
                key: self.root.key().clone(),
                state: root_state,
            },
            derived,
        };
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn teardown(mut self) {
        let mut detached = self.root.detach(self.id);
        for (_, attached) in std::mem::take(&mut self.attached) {
            detached += attached.lease.detach(self.id);
        }
        tracing::debug!(
            target: "graph",
            "[{}] Closed graph on {} ({detached} waiter(s) detached)",
            self.id,
            self.root.key()
        );
    }
}

async fn next_wake(
    commands: &mut mpsc::Receiver<Command>,
    pending: &mut FuturesUnordered<BoxFuture<'static, Step>>,
    root: &mut watch::Receiver<HandleState>,
    attached: &mut BTreeMap<ResourceKey, Attached>,
) -> Wake {
    tokio::select! {
        command = commands.recv() => Wake::Command(command),
        Some(step) = pending.next(), if !pending.is_empty() => Wake::Step(step),
        Ok(()) = root.changed() => Wake::Changed,
        () = derived_changed(attached) => Wake::Changed,
    }
}

async fn derived_changed(attached: &mut BTreeMap<ResourceKey, Attached>) {
    if attached.is_empty() {
        return futures::future::pending().await;
    }
    let changes = attached.values_mut().map(|attached| Box::pin(attached.rx.changed()));
    let _ = select_all(changes).await;
}
