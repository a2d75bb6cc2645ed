//! Repository screen wiring for a GitHub-style REST API.
//!
//! The root resource is `repos/{owner}/{name}`. Three secondary resources are
//! derived from its content:
//!
//! | Edge           | Derived from            | Content                          |
//! |----------------|-------------------------|----------------------------------|
//! | `contributors` | `contributors_url`      | array of contributor objects     |
//! | `languages`    | `languages_url`         | map of language to byte count    |
//! | `starred`      | `full_name`             | `true` or `false`                |
//!
//! Starring writes `user/starred/{owner}/{name}` and, as a side effect,
//! updates `stargazers_count` on the root handle, so a repository header and
//! a star button observing the same repository both reflect the change.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::constants::DEFAULT_BASE_URL;
use crate::core::{ResourceKey, ScopeError};
use crate::graph::{DependencyResolver, DerivationEdge};
use crate::mutation::{MutationEffect, MutationRequest};

/// Edge names used by [`repository_resolver`].
pub const CONTRIBUTORS: &str = "contributors";
pub const LANGUAGES: &str = "languages";
pub const STARRED: &str = "starred";

const STARGAZERS_COUNT: &str = "stargazers_count";

static SLUG_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$").ok());

/// A repository identified as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    /// Owner (user or organization) login.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `repos/{owner}/{name}`
    pub fn root_key(&self) -> ResourceKey {
        ResourceKey::new(format!("repos/{}/{}", self.owner, self.name))
    }

    /// `user/starred/{owner}/{name}`
    pub fn starred_key(&self) -> ResourceKey {
        starred_key(&format!("{}/{}", self.owner, self.name))
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoSlug {
    type Err = ScopeError;

    /// Accepts `owner/name`, optionally as a `github.com` URL or with a `.git` suffix.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ScopeError::InvalidRepository {
            input: input.to_string(),
        };

        let trimmed = input.trim().trim_end_matches('/');
        let trimmed = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .unwrap_or(trimmed);
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

        let pattern = SLUG_PATTERN.as_ref().ok_or_else(invalid)?;
        let captures = pattern.captures(trimmed).ok_or_else(invalid)?;
        let (owner, name) = (&captures[1], &captures[2]);
        if matches!(name, "." | "..") || matches!(owner, "." | "..") {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

fn starred_key(full_name: &str) -> ResourceKey {
    ResourceKey::new(format!("user/starred/{full_name}"))
}

fn url_key(root: &Value, field: &str, base_url: &str) -> Option<ResourceKey> {
    root.get(field)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(|url| ResourceKey::from_url_under(url, base_url))
}

/// The contributors, languages and starred-state edges for the public API.
pub fn repository_resolver() -> DependencyResolver {
    repository_resolver_for(DEFAULT_BASE_URL)
}

/// The same edges for an API served under `base_url`, such as a GitHub
/// Enterprise `https://host/api/v3`. URL fields in the root are turned into
/// keys relative to that base.
pub fn repository_resolver_for(base_url: &str) -> DependencyResolver {
    let contributors_base = base_url.to_string();
    let languages_base = base_url.to_string();
    DependencyResolver::new()
        .with_edge(DerivationEdge::new(CONTRIBUTORS, move |root| {
            url_key(root, "contributors_url", &contributors_base)
        }))
        .with_edge(DerivationEdge::new(LANGUAGES, move |root| {
            url_key(root, "languages_url", &languages_base)
        }))
        .with_edge(DerivationEdge::new(STARRED, |root| {
            root.get("full_name").and_then(Value::as_str).map(starred_key)
        }))
}

/// Whether starred-state content means "starred".
pub fn is_starred(content: Option<&Value>) -> bool {
    match content {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(_) => true,
    }
}

/// The root's `stargazers_count`, if present.
pub fn stargazers(root: Option<&Value>) -> Option<u64> {
    root?.get(STARGAZERS_COUNT)?.as_u64()
}

/// Star (or, with `star == false`, unstar) a repository.
///
/// The starred-state handle becomes `true` or `false`; unstarring still
/// sends a `null` payload so the transport issues a delete. The root's
/// `stargazers_count` is taken from the write response when the server
/// returns one, and otherwise adjusted by one unless the repository was
/// already in the requested state.
pub fn star_request(slug: &RepoSlug, star: bool) -> MutationRequest {
    let (desired, payload) = if star {
        (Value::Bool(true), Value::Object(serde_json::Map::new()))
    } else {
        (Value::Bool(false), Value::Null)
    };

    let effect = MutationEffect::new(slug.root_key(), move |current, context| {
        let current_count = stargazers(current);
        let count = match context.response.get(STARGAZERS_COUNT).and_then(Value::as_u64) {
            Some(count) => count,
            None if is_starred(context.previous.as_deref()) == star => return None,
            None if star => current_count? + 1,
            None => current_count?.saturating_sub(1),
        };
        if current_count == Some(count) {
            return None;
        }

        let mut repo = current?.clone();
        repo.as_object_mut()?.insert(STARGAZERS_COUNT.to_string(), Value::from(count));
        Some(repo)
    });

    MutationRequest::new(slug.starred_key(), desired)
        .with_payload(payload)
        .with_effect(effect)
}
