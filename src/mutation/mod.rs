//! Coordinated writes that ripple into every observer of the affected data.
//!
//! A mutation writes one target resource through the transport and, once the
//! server confirms, updates the target handle and any number of side-effect
//! handles in the shared store. Graphs never hear about the mutation itself:
//! they see the handles they already watch change. Starring a repository, for
//! example, writes `user/starred/{owner}/{name}` and bumps `stargazers_count`
//! on the `repos/{owner}/{name}` handle, so a header view and a detail view
//! over the same repository both update from one action.
//!
//! # Modes
//!
//! - [`MutationMode::Confirmed`] touches handles only after the write succeeds.
//! - [`MutationMode::Optimistic`] shows the desired content right away and
//!   restores the previous content if the write fails.
//!
//! Only one mutation may be in flight per target handle; a second one is
//! rejected with [`ScopeError::Busy`] rather than queued.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResourceStore;
use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::coordinator::{Completion, CompletionEvent, Outcome};
use crate::core::{ResourceKey, ScopeError};
use crate::handle::ResourceHandle;
use crate::transport::Transport;

/// What the user asked for, independent of how it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent {
    /// Resource being changed
    pub target: ResourceKey,
    /// Content the target should have afterwards (`null` for absent)
    pub desired: Value,
    /// When the user initiated the change
    pub initiated_at: DateTime<Utc>,
}

impl MutationIntent {
    /// An intent initiated now.
    pub fn new(target: ResourceKey, desired: Value) -> Self {
        Self {
            target,
            desired,
            initiated_at: Utc::now(),
        }
    }
}

/// When handles are updated relative to the write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutationMode {
    /// After the server confirms the write.
    #[default]
    Confirmed,
    /// Immediately, rolled back if the write fails.
    Optimistic,
}

/// Which content the target handle stores once the write succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetContent {
    /// The intent's desired content.
    #[default]
    Desired,
    /// The server's response body.
    Response,
}

/// Facts available to side effects after a successful write.
#[derive(Debug, Clone)]
pub struct EffectContext {
    /// The mutation's intent
    pub intent: MutationIntent,
    /// The server's response body
    pub response: Value,
    /// The target's content before the mutation started
    pub previous: Option<Arc<Value>>,
}

type EffectFn = Arc<dyn Fn(Option<&Value>, &EffectContext) -> Option<Value> + Send + Sync>;

/// A rewrite of another handle's content, applied after a successful write.
///
/// The function receives the handle's current content and returns the new
/// content, or `None` to leave it untouched. Handles that are not in the
/// store are skipped: nobody observes them, and the next fetch is
/// authoritative anyway.
#[derive(Clone)]
pub struct MutationEffect {
    key: ResourceKey,
    rewrite: EffectFn,
}

impl MutationEffect {
    /// An effect on `key`.
    pub fn new<F>(key: ResourceKey, apply: F) -> Self
    where
        F: Fn(Option<&Value>, &EffectContext) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            key,
            rewrite: Arc::new(apply),
        }
    }

    /// The affected resource.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Compute the rewritten content for `current`.
    pub fn apply(&self, current: Option<&Value>, context: &EffectContext) -> Option<Value> {
        (self.rewrite)(current, context)
    }
}

impl fmt::Debug for MutationEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEffect").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Everything needed to perform one coordinated write.
#[derive(Debug, Clone)]
pub struct MutationRequest {
    pub intent: MutationIntent,
    /// Body sent to the transport; `null` asks for deletion
    pub payload: Value,
    pub mode: MutationMode,
    pub target_content: TargetContent,
    pub effects: Vec<MutationEffect>,
}

impl MutationRequest {
    /// A confirmed write of `desired` to `target`, sending `desired` as payload.
    pub fn new(target: ResourceKey, desired: Value) -> Self {
        Self {
            payload: desired.clone(),
            intent: MutationIntent::new(target, desired),
            mode: MutationMode::default(),
            target_content: TargetContent::default(),
            effects: Vec::new(),
        }
    }

    /// Send `payload` instead of the desired content.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: MutationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_target_content(mut self, target_content: TargetContent) -> Self {
        self.target_content = target_content;
        self
    }

    /// Register a side effect.
    #[must_use]
    pub fn with_effect(mut self, effect: MutationEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Performs writes and propagates their results into the shared store.
pub struct MutationCoordinator {
    store: Arc<ResourceStore>,
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
}

impl MutationCoordinator {
    /// Create a coordinator writing through `transport`.
    pub fn new(store: Arc<ResourceStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound every write by `timeout`.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Start a mutation. The completion fires exactly once for the initiator.
    ///
    /// If the target already has a mutation in flight, the returned completion
    /// has fired with [`ScopeError::Busy`] and nothing is sent.
    pub fn mutate(&self, request: MutationRequest) -> Completion {
        let key = request.intent.target.clone();
        let handle = self.store.handle(&key);

        let optimistic = request.mode == MutationMode::Optimistic;
        let start = match handle.begin_write(optimistic.then_some(&request.intent.desired)) {
            Ok(start) => start,
            Err(error) => {
                tracing::debug!(target: "mutation", "Rejected mutation of {key}: {error}");
                return Completion::ready(CompletionEvent::new(key, Err(error)));
            }
        };

        tracing::debug!(
            target: "mutation",
            "Writing {key} ({:?}, {} effect(s))",
            request.mode,
            request.effects.len()
        );
        let (tx, completion) = Completion::channel(key.clone());
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            let guard = WriteGuard {
                handle: Some(handle),
                restore: optimistic.then(|| start.previous.clone()),
            };

            let write = transport.write(&key, &request.payload);
            let result = match tokio::time::timeout(timeout, write).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("Request timed out after {timeout:?}")),
            };

            let result = match result {
                Ok(response) => {
                    let content = match request.target_content {
                        TargetContent::Desired => request.intent.desired.clone(),
                        TargetContent::Response => response.clone(),
                    };
                    guard.commit(content);

                    let context = EffectContext {
                        intent: request.intent,
                        response,
                        previous: start.previous,
                    };
                    let applied = apply_effects(&store, &request.effects, &context);
                    tracing::debug!(
                        target: "mutation",
                        "Wrote {key}, updated {applied} related handle(s)"
                    );
                    Ok(Outcome::Written)
                }
                Err(error) => {
                    let error = ScopeError::transport(&key, &error);
                    tracing::debug!(target: "mutation", "Write of {key} failed: {error}");
                    guard.fail(error.clone());
                    Err(error)
                }
            };

            // The initiator may have stopped listening
            let _ = tx.send(CompletionEvent::new(key, result));
        });

        completion
    }
}

fn apply_effects(
    store: &ResourceStore,
    effects: &[MutationEffect],
    context: &EffectContext,
) -> usize {
    let mut applied = 0;
    for effect in effects {
        let Some(handle) = store.get(&effect.key) else {
            tracing::trace!(target: "mutation", "Skipping effect on uncached {}", effect.key);
            continue;
        };
        if handle.apply_effect(|current| effect.apply(current, context)) {
            applied += 1;
        }
    }
    applied
}

/// Clears the handle's write flag if the write task ends without settling.
struct WriteGuard {
    handle: Option<ResourceHandle>,
    restore: Option<Option<Arc<Value>>>,
}

impl WriteGuard {
    fn commit(mut self, content: Value) {
        if let Some(handle) = self.handle.take() {
            handle.commit_write(content);
        }
    }

    fn fail(mut self, error: ScopeError) {
        if let Some(handle) = self.handle.take() {
            handle.fail_write(error, self.restore.take());
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let error = ScopeError::Cancelled {
                key: handle.key().clone(),
            };
            handle.fail_write(error, self.restore.take());
        }
    }
}
