//! Process-wide store of resource handles.
//!
//! The store guarantees handle identity: every graph, coordinator and mutation
//! that asks for the same [`ResourceKey`] gets the same [`ResourceHandle`], so a
//! write through one of them is observed by all of them. Entries are reference
//! counted through [`HandleLease`] guards, which graphs hold for the keys they
//! currently observe.
//!
//! Releasing the last lease does not evict the entry. Cached content survives a
//! graph switching away from a key and back again (and a second graph opening
//! on the same repository), until [`ResourceStore::purge_unreferenced`] is
//! called. The store is shared as `Arc<ResourceStore>`; there is no global
//! singleton.
//!
//! # Concurrency
//!
//! Entries live in a `DashMap`, so lookups on different keys do not contend.
//! No shard guard is ever held across an `.await` or while calling into a
//! handle that could call back into the store.

pub mod lease;

pub use lease::HandleLease;

use dashmap::DashMap;
use std::sync::Arc;

use crate::core::ResourceKey;
use crate::handle::ResourceHandle;

struct StoreEntry {
    handle: ResourceHandle,
    refs: usize,
}

/// Keyed, reference-counted handle store.
#[derive(Default)]
pub struct ResourceStore {
    entries: DashMap<ResourceKey, StoreEntry>,
}

impl ResourceStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a counted reference to the handle for `key`, creating it if needed.
    pub fn acquire(self: &Arc<Self>, key: &ResourceKey) -> HandleLease {
        let handle = {
            let mut entry = self.entries.entry(key.clone()).or_insert_with(|| {
                tracing::trace!(target: "store", "Creating handle for {key}");
                StoreEntry {
                    handle: ResourceHandle::new(key.clone()),
                    refs: 0,
                }
            });
            entry.refs += 1;
            entry.handle.clone()
        };
        HandleLease::new(handle, Arc::clone(self))
    }

    pub(crate) fn release(&self, key: &ResourceKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs == 0 {
                tracing::trace!(target: "store", "Last lease on {key} released");
            }
        }
    }

    /// The handle for `key`, creating it without taking a reference.
    ///
    /// Used by mutations, which touch handles only for the duration of a write.
    pub fn handle(&self, key: &ResourceKey) -> ResourceHandle {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| StoreEntry {
                handle: ResourceHandle::new(key.clone()),
                refs: 0,
            })
            .handle
            .clone()
    }

    /// The handle for `key` if the store already has one.
    pub fn get(&self, key: &ResourceKey) -> Option<ResourceHandle> {
        self.entries.get(key).map(|entry| entry.handle.clone())
    }

    /// Number of live leases on `key`.
    pub fn ref_count(&self, key: &ResourceKey) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.refs)
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no handles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys with at least one live lease, sorted.
    pub fn referenced(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.refs > 0)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Mark the cached content of `key` stale. Returns false if the key is unknown.
    pub fn invalidate(&self, key: &ResourceKey) -> bool {
        match self.get(key) {
            Some(handle) => {
                tracing::debug!(target: "store", "Invalidating {key}");
                handle.invalidate();
                true
            }
            None => false,
        }
    }

    /// Evict every entry without leases and without a pending request.
    ///
    /// Returns the number of evicted entries.
    pub fn purge_unreferenced(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.refs > 0 || entry.handle.is_busy());
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(target: "store", "Purged {purged} unreferenced handle(s)");
        }
        purged
    }
}
