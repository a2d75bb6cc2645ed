//! Per-handle request deduplication with single-fire completions.
//!
//! [`RequestCoordinator::ensure_loaded`] is the "load if needed" entry point.
//! It is cheap enough to call on every visibility event:
//!
//! 1. **Joining**: if a fetch is already pending for the handle, the caller is
//!    appended to that request's waiter list. No second transport call is made.
//! 2. **Fresh**: if the [`StalenessPolicy`] says the cached content is young
//!    enough, the caller completes immediately with [`Outcome::Cached`].
//! 3. **Fetching**: otherwise the handle is marked in flight and a task is
//!    spawned to call the transport. Its terminal result is written into the
//!    handle and then delivered to every waiter in registration order.
//!
//! Every caller receives exactly one [`CompletionEvent`]: on success, on
//! failure, on timeout, when its graph detaches it, and when the request task
//! disappears without a result (a [`FetchGuard`] settles the waiters with
//! `Cancelled` on drop, mirroring how the cache's lock guards release on drop).
//!
//! Requests are independent of the callers that triggered them: detaching or
//! dropping a completion never aborts the shared request, which still updates
//! the handle for everyone else.

pub mod completion;

pub use completion::{Completion, CompletionEvent, Outcome};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::core::GraphId;
use crate::handle::{Admission, ResourceHandle, StalenessPolicy, Waiter};
use crate::transport::Transport;

/// Whether a load honours the staleness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Fetch only when the policy says the content is stale.
    IfStale,
    /// Fetch regardless of age (still joins a pending request).
    Force,
}

/// Issues fetches through the transport, at most one in flight per handle.
pub struct RequestCoordinator {
    transport: Arc<dyn Transport>,
    policy: StalenessPolicy,
    request_timeout: Duration,
}

impl RequestCoordinator {
    /// Create a coordinator with the default request timeout.
    pub fn new(transport: Arc<dyn Transport>, policy: StalenessPolicy) -> Self {
        Self {
            transport,
            policy,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound every transport call by `timeout`.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The staleness policy gating fetches.
    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// The transport used for fetches.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The per-call timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Load `handle` if its content is missing or stale.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn ensure_loaded(&self, handle: &ResourceHandle) -> Completion {
        self.load(handle, None, LoadMode::IfStale)
    }

    /// Fetch `handle` regardless of age, joining a pending request if any.
    pub fn refresh(&self, handle: &ResourceHandle) -> Completion {
        self.load(handle, None, LoadMode::Force)
    }

    /// Register a caller owned by graph `owner` (so teardown can detach it).
    pub(crate) fn load(
        &self,
        handle: &ResourceHandle,
        owner: Option<GraphId>,
        mode: LoadMode,
    ) -> Completion {
        let (tx, completion) = Completion::channel(handle.key().clone());
        let policy = self.policy;
        let admission = handle.admit(Waiter::new(owner, tx), |state| {
            mode == LoadMode::Force || policy.should_fetch(state, Instant::now())
        });

        match admission {
            Admission::Joined => {
                tracing::trace!(target: "coordinator", "Joining pending fetch of {}", handle.key());
            }
            Admission::Fresh => {
                tracing::trace!(target: "coordinator", "Serving {} from cache", handle.key());
            }
            Admission::Started { generation } => {
                tracing::debug!(target: "coordinator", "Fetching {}", handle.key());
                self.spawn_fetch(handle.clone(), generation);
            }
        }
        completion
    }

    fn spawn_fetch(&self, handle: ResourceHandle, generation: u64) {
        let transport = Arc::clone(&self.transport);
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            let key = handle.key().clone();
            let guard = FetchGuard::new(handle);

            let result = match tokio::time::timeout(timeout, transport.fetch(&key)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("Request timed out after {timeout:?}")),
            };

            if let Err(error) = &result {
                tracing::debug!(target: "coordinator", "Fetch of {key} failed: {error:#}");
            }
            let notified = guard.settle(result, generation);
            tracing::trace!(target: "coordinator", "Completed {notified} waiter(s) for {key}");
        });
    }
}

/// Settles a pending fetch with `Cancelled` if the fetch task ends without a result.
struct FetchGuard {
    handle: Option<ResourceHandle>,
}

impl FetchGuard {
    fn new(handle: ResourceHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn settle(mut self, result: anyhow::Result<serde_json::Value>, generation: u64) -> usize {
        match self.handle.take() {
            Some(handle) => handle.settle_fetch(result, generation),
            None => 0,
        }
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(target: "coordinator", "Fetch of {} abandoned", handle.key());
            handle.abandon_fetch();
        }
    }
}
