//! In-memory transport for fixtures and tests.
//!
//! Resources are served from a map. Every call is counted per key, failures
//! can be injected per key, and [`MemoryTransport::hold`] parks requests for a
//! key until [`MemoryTransport::release`] is called, which is how the tests
//! keep a fetch in flight while they attach or detach observers.

use anyhow::{Context, Result, anyhow};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

use super::Transport;
use crate::core::ResourceKey;

/// On-disk fixture format.
///
/// ```json
/// {
///   "resources": { "repos/octo/demo": { "full_name": "octo/demo" } },
///   "writes": { "user/starred/octo/demo": true }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    /// Content served by `fetch`, by key.
    #[serde(default)]
    pub resources: BTreeMap<String, Value>,
    /// Responses returned by `write`, by key.
    #[serde(default)]
    pub writes: BTreeMap<String, Value>,
}

/// A [`Transport`] backed by in-memory maps.
///
/// Keys without content resolve to `null` (absent). Writes without a
/// configured response echo the payload back.
#[derive(Default)]
pub struct MemoryTransport {
    resources: DashMap<ResourceKey, Value>,
    write_responses: DashMap<ResourceKey, Value>,
    fetch_failures: DashMap<ResourceKey, String>,
    write_failures: DashMap<ResourceKey, String>,
    gates: DashMap<ResourceKey, watch::Sender<bool>>,
    fetches: DashMap<ResourceKey, usize>,
    writes: DashMap<ResourceKey, usize>,
    total_fetches: AtomicUsize,
}

impl MemoryTransport {
    /// An empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transport serving `fixture`.
    pub fn from_fixture(fixture: Fixture) -> Self {
        let transport = Self::new();
        for (key, value) in fixture.resources {
            transport.insert(key, value);
        }
        for (key, value) in fixture.writes {
            transport.set_write_response(key, value);
        }
        transport
    }

    /// Load a JSON fixture file.
    pub async fn load_fixture(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture: {}", path.display()))?;

        tracing::debug!(
            target: "transport",
            "Loaded {} resource(s) from {}",
            fixture.resources.len(),
            path.display()
        );
        Ok(Self::from_fixture(fixture))
    }

    /// Serve `value` for `key`.
    pub fn insert(&self, key: impl Into<ResourceKey>, value: Value) {
        self.resources.insert(key.into(), value);
    }

    /// Stop serving `key` (it becomes absent).
    pub fn remove(&self, key: impl Into<ResourceKey>) {
        self.resources.remove(&key.into());
    }

    /// Respond to writes on `key` with `value`.
    pub fn set_write_response(&self, key: impl Into<ResourceKey>, value: Value) {
        self.write_responses.insert(key.into(), value);
    }

    /// Fail every fetch of `key` with `message`.
    pub fn fail(&self, key: impl Into<ResourceKey>, message: impl Into<String>) {
        self.fetch_failures.insert(key.into(), message.into());
    }

    /// Let fetches of `key` succeed again.
    pub fn clear_failure(&self, key: impl Into<ResourceKey>) {
        self.fetch_failures.remove(&key.into());
    }

    /// Fail every write to `key` with `message`.
    pub fn fail_writes(&self, key: impl Into<ResourceKey>, message: impl Into<String>) {
        self.write_failures.insert(key.into(), message.into());
    }

    /// Park requests for `key` until [`release`](Self::release).
    pub fn hold(&self, key: impl Into<ResourceKey>) {
        self.gates.entry(key.into()).or_insert_with(|| watch::channel(false).0);
    }

    /// Let parked and future requests for `key` proceed.
    pub fn release(&self, key: impl Into<ResourceKey>) {
        if let Some((_, gate)) = self.gates.remove(&key.into()) {
            gate.send_replace(true);
        }
    }

    /// Number of fetches issued for `key`.
    pub fn fetch_count(&self, key: impl Into<ResourceKey>) -> usize {
        self.fetches.get(&key.into()).map_or(0, |count| *count)
    }

    /// Number of writes issued for `key`.
    pub fn write_count(&self, key: impl Into<ResourceKey>) -> usize {
        self.writes.get(&key.into()).map_or(0, |count| *count)
    }

    /// Number of fetches issued for any key.
    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self, key: &ResourceKey) {
        // Subscribe under the shard lock, wait without it
        let gate = self.gates.get(key).map(|gate| gate.subscribe());
        if let Some(mut rx) = gate {
            tracing::trace!(target: "transport", "Holding request for {key}");
            let _ = rx.wait_for(|open| *open).await;
        }
    }
}

impl Transport for MemoryTransport {
    fn fetch<'a>(&'a self, key: &'a ResourceKey) -> BoxFuture<'a, Result<Value>> {
        async move {
            *self.fetches.entry(key.clone()).or_insert(0) += 1;
            self.total_fetches.fetch_add(1, Ordering::SeqCst);
            self.pass_gate(key).await;

            if let Some(message) = self.fetch_failures.get(key).map(|m| m.clone()) {
                return Err(anyhow!(message));
            }
            Ok(self.resources.get(key).map_or(Value::Null, |value| value.clone()))
        }
        .boxed()
    }

    fn write<'a>(
        &'a self,
        key: &'a ResourceKey,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            *self.writes.entry(key.clone()).or_insert(0) += 1;
            self.pass_gate(key).await;

            if let Some(message) = self.write_failures.get(key).map(|m| m.clone()) {
                return Err(anyhow!(message));
            }
            let response = self.write_responses.get(key).map(|value| value.clone());
            Ok(response.unwrap_or_else(|| payload.clone()))
        }
        .boxed()
    }
}
