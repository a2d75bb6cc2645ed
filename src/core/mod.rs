//! Core types shared by every layer of reposcope.
//!
//! - [`ResourceKey`] identifies one server-backed resource.
//! - [`GraphId`] identifies one observation graph (one UI session).
//! - [`ScopeError`] is the cloneable error that travels through handles and
//!   completion events; [`ErrorContext`] and [`user_friendly_error`] turn any
//!   error into CLI output with suggestions.

pub mod error;
pub mod key;

pub use error::{ErrorContext, ScopeError, user_friendly_error};
pub use key::{GraphId, ResourceKey};
