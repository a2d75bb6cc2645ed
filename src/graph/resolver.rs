//! Derivation of secondary resource keys from root content.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::ResourceKey;

/// Name of one derivation edge, e.g. `languages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(String);

impl EdgeId {
    /// Create an edge id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Pure function from root content to a derived key.
pub type DeriveFn = Arc<dyn Fn(&Value) -> Option<ResourceKey> + Send + Sync>;

/// A named derivation from the root's content to one secondary resource.
#[derive(Clone)]
pub struct DerivationEdge {
    id: EdgeId,
    derive: DeriveFn,
}

impl DerivationEdge {
    /// Create an edge from a derivation function.
    pub fn new<F>(id: impl Into<EdgeId>, derive: F) -> Self
    where
        F: Fn(&Value) -> Option<ResourceKey> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            derive: Arc::new(derive),
        }
    }

    /// The edge's name.
    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    /// Evaluate the edge against root content.
    pub fn derive(&self, root: &Value) -> Option<ResourceKey> {
        (self.derive)(root)
    }
}

impl fmt::Debug for DerivationEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationEdge").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Current derived key per edge; `None` when an edge yields no key.
pub type Resolution = BTreeMap<EdgeId, Option<ResourceKey>>;

/// How one edge's key changed between two resolutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    /// The edge now yields a key where it yielded none.
    Attached(ResourceKey),
    /// The edge yields a different key.
    Replaced { from: ResourceKey, to: ResourceKey },
    /// The edge no longer yields a key.
    Detached(ResourceKey),
}

/// Evaluates every derivation edge against the root's content.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    edges: Vec<DerivationEdge>,
}

impl DependencyResolver {
    /// A resolver without edges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. An edge with an existing id replaces it.
    #[must_use]
    pub fn with_edge(mut self, edge: DerivationEdge) -> Self {
        self.edges.retain(|existing| existing.id != edge.id);
        self.edges.push(edge);
        self
    }

    /// The registered edges.
    pub fn edges(&self) -> &[DerivationEdge] {
        &self.edges
    }

    /// Map every edge to its derived key.
    ///
    /// Absent root content yields `None` for every edge.
    pub fn resolve(&self, root: Option<&Value>) -> Resolution {
        self.edges
            .iter()
            .map(|edge| (edge.id.clone(), root.and_then(|content| edge.derive(content))))
            .collect()
    }
}

/// Per-edge differences from `old` to `new`. Unchanged edges are omitted.
pub fn diff(old: &Resolution, new: &Resolution) -> Vec<(EdgeId, EdgeChange)> {
    let mut changes = Vec::new();
    let ids = old.keys().chain(new.keys().filter(|id| !old.contains_key(*id)));

    for id in ids {
        let before = old.get(id).cloned().flatten();
        let after = new.get(id).cloned().flatten();
        let change = match (before, after) {
            (None, Some(to)) => EdgeChange::Attached(to),
            (Some(from), Some(to)) if from != to => EdgeChange::Replaced { from, to },
            (Some(from), None) => EdgeChange::Detached(from),
            _ => continue,
        };
        changes.push((id.clone(), change));
    }
    changes
}
