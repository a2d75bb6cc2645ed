//! Single-fire completion events for fetches and writes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::core::{ResourceKey, ScopeError};

/// How a successful request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from fresh cached content without a request.
    Cached,
    /// A fetch completed and its result was applied.
    Fetched,
    /// A mutation's write completed and its result was applied.
    Written,
}

/// Terminal event delivered to exactly one caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    /// Resource the request was made for
    pub key: ResourceKey,
    /// Success kind, or the error that ended the request
    pub result: Result<Outcome, ScopeError>,
}

impl CompletionEvent {
    /// Create an event for `key`.
    pub fn new(key: ResourceKey, result: Result<Outcome, ScopeError>) -> Self {
        Self { key, result }
    }

    /// Shorthand for a cancellation event.
    pub fn cancelled(key: ResourceKey) -> Self {
        let error = ScopeError::Cancelled { key: key.clone() };
        Self::new(key, Err(error))
    }

    /// The success kind, if the request succeeded.
    pub fn outcome(&self) -> Option<Outcome> {
        self.result.as_ref().ok().copied()
    }

    /// The error, if the request failed or was cancelled.
    pub fn error(&self) -> Option<&ScopeError> {
        self.result.as_ref().err()
    }

    /// Whether the request succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Whether the caller was detached before the request settled.
    pub fn is_cancelled(&self) -> bool {
        self.error().is_some_and(ScopeError::is_cancelled)
    }
}

/// Future resolving to the caller's one [`CompletionEvent`].
///
/// If the producing side disappears without firing (the request task was
/// dropped, or the runtime is shutting down) the future still resolves, with a
/// cancellation event, so every caller observes exactly one completion.
#[derive(Debug)]
#[must_use = "dropping a Completion only stops delivery; the request keeps running"]
pub struct Completion {
    key: ResourceKey,
    rx: oneshot::Receiver<CompletionEvent>,
}

impl Completion {
    pub(crate) fn new(key: ResourceKey, rx: oneshot::Receiver<CompletionEvent>) -> Self {
        Self { key, rx }
    }

    /// Create a sender/completion pair for `key`.
    pub(crate) fn channel(key: ResourceKey) -> (oneshot::Sender<CompletionEvent>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self::new(key, rx))
    }

    /// A completion that has already fired with `event`.
    pub(crate) fn ready(event: CompletionEvent) -> Self {
        let (tx, completion) = Self::channel(event.key.clone());
        let _ = tx.send(event);
        completion
    }

    /// The resource this completion belongs to.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

impl Future for Completion {
    type Output = CompletionEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(event)) => Poll::Ready(event),
            Poll::Ready(Err(_)) => Poll::Ready(CompletionEvent::cancelled(self.key.clone())),
            Poll::Pending => Poll::Pending,
        }
    }
}
