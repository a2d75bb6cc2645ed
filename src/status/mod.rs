//! Prioritized aggregation of per-handle states into one UI signal.
//!
//! A view over a graph usually shows one thing at a time: the data, a spinner,
//! or an error banner. [`StatusAggregator`] picks which, by walking its
//! priority list and returning the first [`StatusKind`] for which at least one
//! handle qualifies. With the default priority `[AnyData, Loading, Error]`,
//! partially loaded data beats a spinner, and a spinner beats an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::DEFAULT_PRIORITY;
use crate::core::ScopeError;
use crate::handle::HandleState;

/// One displayable status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusKind {
    /// Some handle has content.
    AnyData,
    /// Some handle has a fetch in flight.
    Loading,
    /// Some handle has a `last_error`.
    Error,
}

impl StatusKind {
    /// The configuration spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnyData => "any-data",
            Self::Loading => "loading",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "any-data" | "data" => Ok(Self::AnyData),
            "loading" => Ok(Self::Loading),
            "error" => Ok(Self::Error),
            other => {
                anyhow::bail!("Unknown status kind '{other}' (expected any-data, loading or error)")
            }
        }
    }
}

/// Combined status of every handle in a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateStatus {
    /// The kind to display, or `None` when no handle qualifies for any kind.
    pub display: Option<StatusKind>,
    /// Some handle has a fetch in flight.
    pub loading: bool,
    /// The first error found, in handle order.
    pub error: Option<ScopeError>,
    /// Some handle has content.
    pub has_any_data: bool,
}

/// Folds handle states according to a priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAggregator {
    priority: Vec<StatusKind>,
}

impl StatusAggregator {
    /// Aggregator with an explicit priority. Duplicate kinds are ignored.
    pub fn new(priority: impl IntoIterator<Item = StatusKind>) -> Self {
        let mut ordered = Vec::new();
        for kind in priority {
            if !ordered.contains(&kind) {
                ordered.push(kind);
            }
        }
        Self { priority: ordered }
    }

    /// The effective priority order.
    pub fn priority(&self) -> &[StatusKind] {
        &self.priority
    }

    /// Aggregate the given handle states.
    ///
    /// Kinds missing from the priority list are never displayed, though the
    /// `loading`, `error` and `has_any_data` fields are always filled in.
    pub fn aggregate<'a>(
        &self,
        states: impl IntoIterator<Item = &'a HandleState>,
    ) -> AggregateStatus {
        let mut status = AggregateStatus::default();
        for state in states {
            status.loading |= state.in_flight;
            status.has_any_data |= state.content.is_some();
            if status.error.is_none() {
                status.error = state.last_error.clone();
            }
        }

        status.display = self.priority.iter().copied().find(|kind| match kind {
            StatusKind::AnyData => status.has_any_data,
            StatusKind::Loading => status.loading,
            StatusKind::Error => status.error.is_some(),
        });
        status
    }
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY)
    }
}
