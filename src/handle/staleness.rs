//! Freshness gate for "load if needed" calls.

use std::time::Duration;
use tokio::time::Instant;

use crate::constants::DEFAULT_MAX_AGE;
use crate::handle::HandleState;

/// Decides whether a handle's cached content may be served without a request.
///
/// The policy is what makes `ensure_loaded` safe to call on every visibility
/// event: a handle whose content was fetched less than `max_age` ago is served
/// from cache. A newer error from a background revalidation does not make
/// otherwise fresh content stale; the error is only exposed via `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    max_age: Duration,
}

impl StalenessPolicy {
    /// Policy serving cached content for up to `max_age`.
    ///
    /// A zero `max_age` fetches on every call.
    pub const fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// The configured maximum age.
    pub const fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Returns false iff content is present and younger than `max_age` at `now`.
    pub fn should_fetch(&self, state: &HandleState, now: Instant) -> bool {
        match (&state.content, state.last_fetched_at) {
            (Some(_), Some(fetched_at)) => {
                now.saturating_duration_since(fetched_at) >= self.max_age
            }
            _ => true,
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}
