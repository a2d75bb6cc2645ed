//! Error handling for reposcope
//!
//! The error system follows two rules:
//! 1. **Strongly-typed, cloneable errors** ([`ScopeError`]) travel through the
//!    coordination layer. They are stored as a handle's `last_error` and fanned
//!    out to every caller waiting on the same request, so they must be `Clone`.
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions are
//!    produced at the CLI boundary by [`user_friendly_error`].
//!
//! Handle-level errors are local: a failed fetch never tears down a graph or a
//! neighbouring handle. It only shows up in `last_error` and in the aggregate
//! status when no higher-priority kind applies.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::core::ResourceKey;

/// The main error type for coordination operations.
///
/// # Error Categories
///
/// - [`Transport`](ScopeError::Transport): the fetch or write primitive failed
///   (network, timeout, non-success status). Stored in `last_error`.
/// - [`Busy`](ScopeError::Busy): a mutation was rejected because another one is
///   already in flight for the same handle.
/// - [`Cancelled`](ScopeError::Cancelled): the waiting caller was detached (its
///   graph was torn down) or the request task went away before settling.
/// - [`InvalidRepository`](ScopeError::InvalidRepository): a repository slug
///   could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The underlying transport call failed.
    #[error("Request for '{key}' failed: {message}")]
    Transport {
        /// Resource the request was issued for
        key: ResourceKey,
        /// Rendered transport error chain
        message: String,
    },

    /// A mutation is already in flight for this handle.
    #[error("A change to '{key}' is already in progress")]
    Busy {
        /// Resource with the in-flight mutation
        key: ResourceKey,
    },

    /// The waiting caller was detached before the request settled.
    #[error("Request for '{key}' was cancelled")]
    Cancelled {
        /// Resource the cancelled caller was waiting on
        key: ResourceKey,
    },

    /// Repository slug is not of the form `owner/name`.
    #[error("Invalid repository '{input}': expected 'owner/name'")]
    InvalidRepository {
        /// The rejected input
        input: String,
    },
}

impl ScopeError {
    /// Build a transport error from an `anyhow` chain, keeping every cause.
    pub fn transport(key: &ResourceKey, error: &anyhow::Error) -> Self {
        Self::Transport {
            key: key.clone(),
            message: format!("{error:#}"),
        }
    }

    /// Whether this error marks a detached caller rather than a failure.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether this error is a rejected concurrent mutation.
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Error wrapper adding details and a suggestion for CLI output.
#[derive(Debug)]
pub struct ErrorContext {
    /// The headline error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with only a headline.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-facing [`ErrorContext`] with suggestions.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(scope_error) = error.downcast_ref::<ScopeError>() {
        return create_error_context(scope_error);
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(format!("Invalid configuration: {toml_error}"))
            .with_suggestion("Check the TOML syntax of your reposcope config file")
            .with_details("Keys must match the documented [transport] and top-level settings");
    }

    if let Some(json_error) = error.downcast_ref::<serde_json::Error>() {
        return ErrorContext::new(format!("Invalid JSON: {json_error}"))
            .with_suggestion("Check that the fixture file is a JSON object with a 'resources' map");
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::NotFound {
            return ErrorContext::new(format!("{error:#}"))
                .with_suggestion("Check that the file exists and the path is correct");
        }
    }

    ErrorContext::new(format!("{error:#}"))
}

fn create_error_context(error: &ScopeError) -> ErrorContext {
    match error {
        ScopeError::Transport { message, .. } => ErrorContext::new(error.to_string())
            .with_details(message.clone())
            .with_suggestion(
                if message.contains("401") || message.contains("403") {
                    "Check the API token in your config or the GITHUB_TOKEN environment variable"
                } else if message.contains("timed out") {
                    "The server did not answer in time. Retry or raise transport.timeout_secs"
                } else {
                    "Check your internet connection and the configured base_url, then retry"
                },
            ),
        ScopeError::Busy { .. } => ErrorContext::new(error.to_string())
            .with_suggestion("Wait for the previous change to finish before retrying"),
        ScopeError::Cancelled { .. } => ErrorContext::new(error.to_string()),
        ScopeError::InvalidRepository { .. } => ErrorContext::new(error.to_string())
            .with_suggestion("Pass the repository as owner/name, e.g. rust-lang/rust"),
    }
}
