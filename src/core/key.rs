//! Identity types shared by handles, graphs and the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one addressable piece of server data.
///
/// Keys are API paths relative to the transport's base URL, for example
/// `repos/rust-lang/rust` or `user/starred/rust-lang/rust`. Two handles with
/// equal keys are the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Create a key, trimming surrounding slashes so `"/repos/a/b/"` and
    /// `"repos/a/b"` address the same resource.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let trimmed = key.trim_matches('/');
        if trimmed.len() == key.len() {
            Self(key)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Build a key from an absolute API URL by dropping scheme and host.
    ///
    /// Strings without a scheme are treated as keys already.
    ///
    /// ```
    /// use reposcope::core::ResourceKey;
    ///
    /// let key = ResourceKey::from_url("https://api.github.com/repos/octo/hello/languages");
    /// assert_eq!(key.as_str(), "repos/octo/hello/languages");
    /// ```
    pub fn from_url(url: &str) -> Self {
        let path = match url.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map_or("", |(_, path)| path),
            None => url,
        };
        Self::new(strip_query(path))
    }

    /// Build a key from an absolute URL served under `base_url`.
    ///
    /// The whole base (including any path prefix such as `/api/v3`) is
    /// removed, so the key joins back onto the same base. URLs outside the
    /// base fall back to [`from_url`](Self::from_url).
    ///
    /// ```
    /// use reposcope::core::ResourceKey;
    ///
    /// let key = ResourceKey::from_url_under(
    ///     "https://github.example.com/api/v3/repos/octo/hello/languages",
    ///     "https://github.example.com/api/v3",
    /// );
    /// assert_eq!(key.as_str(), "repos/octo/hello/languages");
    /// ```
    pub fn from_url_under(url: &str, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        match url.strip_prefix(base) {
            Some(rest) if !base.is_empty() && is_path_boundary(rest) => {
                Self::new(strip_query(rest))
            }
            _ => Self::from_url(url),
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or_default()
}

fn is_path_boundary(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with(['/', '?', '#'])
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Identity of one observation graph, used to detach its waiters on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(Uuid);

impl GraphId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}
