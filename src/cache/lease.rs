//! RAII references to store entries.

use std::ops::Deref;
use std::sync::Arc;

use super::ResourceStore;
use crate::handle::ResourceHandle;

/// A counted reference to one handle in a [`ResourceStore`].
///
/// While at least one lease exists for a key, the store keeps the handle
/// (and its cached content) alive. Dropping the lease releases the reference;
/// the entry itself stays cached until [`ResourceStore::purge_unreferenced`].
pub struct HandleLease {
    handle: ResourceHandle,
    store: Arc<ResourceStore>,
}

impl HandleLease {
    pub(super) fn new(handle: ResourceHandle, store: Arc<ResourceStore>) -> Self {
        Self { handle, store }
    }

    /// The leased handle.
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }
}

impl Deref for HandleLease {
    type Target = ResourceHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl std::fmt::Debug for HandleLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HandleLease").field(self.handle.key()).finish()
    }
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        self.store.release(self.handle.key());
    }
}
