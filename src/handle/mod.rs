//! Shared, identity-keyed state for one server-backed resource.
//!
//! A [`ResourceHandle`] is the single owner of a resource's cached state. It is
//! never copied: every graph, coordinator and view holds a clone of the same
//! `Arc`, and observes changes through a `tokio::sync::watch` channel created
//! with the handle.
//!
//! # State Machine
//!
//! Besides the observable [`HandleState`] the handle carries private
//! coordination state guarded by a mutex:
//!
//! ```text
//! Idle ──admit(needs fetch)──▶ Fetching(waiters) ──settle/abandon──▶ Idle
//!   │                              ▲      │
//!   │                              └──────┘ admit: caller joins waiters
//!   └──begin_write──▶ Writing ──commit/fail──▶ Idle     (begin_write while Writing: Busy)
//! ```
//!
//! `in_flight` in the observable state is true exactly while a fetch is
//! pending. Only the request and mutation coordinators drive these transitions;
//! every other component treats the handle as read-only.

pub mod staleness;

pub use staleness::StalenessPolicy;

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::coordinator::{CompletionEvent, Outcome};
use crate::core::{GraphId, ResourceKey, ScopeError};

/// Observable state of one handle.
///
/// `content` and `last_error` are not mutually exclusive: stale content stays
/// visible while the latest fetch attempt failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandleState {
    /// Last successfully fetched or written content; `None` when absent.
    pub content: Option<Arc<Value>>,
    /// When `content` was last confirmed by the server.
    pub last_fetched_at: Option<Instant>,
    /// Error from the most recent failed request, cleared by the next success.
    pub last_error: Option<ScopeError>,
    /// A fetch is pending for this handle.
    pub in_flight: bool,
    /// A mutation is pending for this handle.
    pub mutating: bool,
    /// Bumped by every committed write or side effect.
    pub generation: u64,
}

impl HandleState {
    /// Whether any content is cached.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

/// A caller waiting for the pending fetch to settle.
pub(crate) struct Waiter {
    owner: Option<GraphId>,
    tx: oneshot::Sender<CompletionEvent>,
}

impl Waiter {
    pub(crate) fn new(owner: Option<GraphId>, tx: oneshot::Sender<CompletionEvent>) -> Self {
        Self { owner, tx }
    }

    fn fire(self, event: CompletionEvent) {
        // A dropped receiver means the caller stopped listening
        let _ = self.tx.send(event);
    }
}

#[derive(Default)]
struct Coordination {
    /// Waiters of the pending fetch, in registration order.
    fetch: Option<Vec<Waiter>>,
    write_in_flight: bool,
}

/// Result of registering a caller with [`ResourceHandle::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The caller joined an already pending fetch.
    Joined,
    /// Content is fresh; the caller was completed immediately.
    Fresh,
    /// A new fetch must be issued; `generation` is the state generation at issue time.
    Started { generation: u64 },
}

/// Snapshot of a handle taken when a write begins.
pub(crate) struct WriteStart {
    /// Content before the write (and before any optimistic update).
    pub previous: Option<Arc<Value>>,
}

struct HandleInner {
    key: ResourceKey,
    state: watch::Sender<HandleState>,
    coordination: Mutex<Coordination>,
}

/// Cached state plus in-flight bookkeeping for one resource.
///
/// Cloning is cheap and yields another reference to the same handle.
#[derive(Clone)]
pub struct ResourceHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.inner.key)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl ResourceHandle {
    /// Create an empty handle for `key`.
    pub fn new(key: ResourceKey) -> Self {
        let (state, _) = watch::channel(HandleState::default());
        Self {
            inner: Arc::new(HandleInner {
                key,
                state,
                coordination: Mutex::new(Coordination::default()),
            }),
        }
    }

    /// The handle's identity.
    pub fn key(&self) -> &ResourceKey {
        &self.inner.key
    }

    /// A copy of the current state.
    pub fn state(&self) -> HandleState {
        self.inner.state.borrow().clone()
    }

    /// The current content, if any.
    pub fn content(&self) -> Option<Arc<Value>> {
        self.inner.state.borrow().content.clone()
    }

    /// Whether a fetch is pending.
    pub fn is_in_flight(&self) -> bool {
        self.inner.state.borrow().in_flight
    }

    /// Subscribe to state changes.
    ///
    /// The receiver starts with the current state marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<HandleState> {
        self.inner.state.subscribe()
    }

    /// Whether two handles are the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn coordination(&self) -> MutexGuard<'_, Coordination> {
        self.inner.coordination.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn event(&self, outcome: Result<Outcome, ScopeError>) -> CompletionEvent {
        CompletionEvent::new(self.inner.key.clone(), outcome)
    }

    /// Register `waiter`, deciding atomically whether it joins, completes from
    /// cache, or starts a new fetch.
    pub(crate) fn admit(
        &self,
        waiter: Waiter,
        needs_fetch: impl FnOnce(&HandleState) -> bool,
    ) -> Admission {
        let mut coordination = self.coordination();

        if let Some(waiters) = coordination.fetch.as_mut() {
            waiters.push(waiter);
            return Admission::Joined;
        }

        let (fetch, generation) = {
            let state = self.inner.state.borrow();
            (needs_fetch(&state), state.generation)
        };
        if !fetch {
            drop(coordination);
            waiter.fire(self.event(Ok(Outcome::Cached)));
            return Admission::Fresh;
        }

        coordination.fetch = Some(vec![waiter]);
        self.inner.state.send_modify(|state| state.in_flight = true);
        Admission::Started { generation }
    }

    /// Apply the terminal result of a fetch and complete every waiter.
    ///
    /// Content from a fetch issued before a later write (`generation` mismatch)
    /// does not overwrite the written content. Returns the number of waiters
    /// completed.
    pub(crate) fn settle_fetch(&self, result: anyhow::Result<Value>, generation: u64) -> usize {
        let mut coordination = self.coordination();
        let waiters = coordination.fetch.take().unwrap_or_default();

        let outcome = match result {
            Ok(value) => {
                self.inner.state.send_modify(|state| {
                    state.in_flight = false;
                    if state.generation == generation {
                        state.content = into_content(value);
                        state.last_fetched_at = Some(Instant::now());
                        state.last_error = None;
                    } else {
                        tracing::debug!(
                            target: "coordinator",
                            "Discarding fetch of {} superseded by a write",
                            self.inner.key
                        );
                    }
                });
                Ok(Outcome::Fetched)
            }
            Err(error) => {
                let error = ScopeError::transport(&self.inner.key, &error);
                self.inner.state.send_modify(|state| {
                    state.in_flight = false;
                    state.last_error = Some(error.clone());
                });
                Err(error)
            }
        };
        drop(coordination);

        let count = waiters.len();
        let event = self.event(outcome);
        for waiter in waiters {
            waiter.fire(event.clone());
        }
        count
    }

    /// Complete every waiter with `Cancelled` and clear the pending fetch.
    ///
    /// Used when the request task goes away without a terminal result.
    pub(crate) fn abandon_fetch(&self) {
        let mut coordination = self.coordination();
        let Some(waiters) = coordination.fetch.take() else {
            return;
        };
        self.inner.state.send_modify(|state| state.in_flight = false);
        drop(coordination);

        for waiter in waiters {
            waiter.fire(self.event(Err(self.cancelled())));
        }
    }

    /// Stop delivering to every waiter registered by `owner`.
    ///
    /// Detached waiters complete with `Cancelled`; the shared request itself
    /// keeps running and still updates the handle. Returns the number detached.
    pub(crate) fn detach(&self, owner: GraphId) -> usize {
        let mut coordination = self.coordination();
        let Some(waiters) = coordination.fetch.as_mut() else {
            return 0;
        };

        let (detached, kept): (Vec<_>, Vec<_>) =
            waiters.drain(..).partition(|waiter| waiter.owner == Some(owner));
        *waiters = kept;
        drop(coordination);

        let count = detached.len();
        for waiter in detached {
            waiter.fire(self.event(Err(self.cancelled())));
        }
        count
    }

    /// Mark a write as in flight, rejecting a concurrent one with `Busy`.
    ///
    /// With `optimistic` set, the desired content is applied immediately.
    pub(crate) fn begin_write(&self, optimistic: Option<&Value>) -> Result<WriteStart, ScopeError> {
        let mut coordination = self.coordination();
        if coordination.write_in_flight {
            return Err(ScopeError::Busy {
                key: self.inner.key.clone(),
            });
        }
        coordination.write_in_flight = true;

        let previous = self.content();
        self.inner.state.send_modify(|state| {
            state.mutating = true;
            if let Some(desired) = optimistic {
                state.content = into_content(desired.clone());
            }
        });
        Ok(WriteStart { previous })
    }

    /// Store confirmed content after a successful write.
    pub(crate) fn commit_write(&self, content: Value) {
        let mut coordination = self.coordination();
        coordination.write_in_flight = false;
        self.inner.state.send_modify(|state| {
            state.mutating = false;
            state.content = into_content(content);
            state.last_fetched_at = Some(Instant::now());
            state.last_error = None;
            state.generation += 1;
        });
    }

    /// Record a failed write, restoring `restore` when an optimistic update must be undone.
    pub(crate) fn fail_write(&self, error: ScopeError, restore: Option<Option<Arc<Value>>>) {
        let mut coordination = self.coordination();
        coordination.write_in_flight = false;
        self.inner.state.send_modify(|state| {
            state.mutating = false;
            state.last_error = Some(error);
            if let Some(previous) = restore {
                state.content = previous;
            }
        });
    }

    /// Rewrite this handle's content as a side effect of a mutation elsewhere.
    ///
    /// `apply` returns the new content, or `None` to leave the handle untouched.
    pub(crate) fn apply_effect(&self, apply: impl FnOnce(Option<&Value>) -> Option<Value>) -> bool {
        let _coordination = self.coordination();
        self.inner.state.send_if_modified(|state| {
            match apply(state.content.as_deref()) {
                Some(updated) => {
                    state.content = into_content(updated);
                    state.generation += 1;
                    true
                }
                None => false,
            }
        })
    }

    /// Forget when content was last confirmed so the next load refetches it.
    ///
    /// Content stays visible until the refetch replaces it.
    pub(crate) fn invalidate(&self) {
        self.inner.state.send_if_modified(|state| state.last_fetched_at.take().is_some());
    }

    /// Whether a fetch or a write is currently pending.
    pub(crate) fn is_busy(&self) -> bool {
        let coordination = self.coordination();
        coordination.fetch.is_some() || coordination.write_in_flight
    }

    fn cancelled(&self) -> ScopeError {
        ScopeError::Cancelled {
            key: self.inner.key.clone(),
        }
    }
}

/// `null` from the transport means the resource is absent.
fn into_content(value: Value) -> Option<Arc<Value>> {
    if value.is_null() { None } else { Some(Arc::new(value)) }
}
