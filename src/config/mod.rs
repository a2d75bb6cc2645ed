//! Configuration management for reposcope
//!
//! All settings live in one optional TOML file. Lookup order:
//!
//! 1. `--config <path>` on the command line
//! 2. `$REPOSCOPE_CONFIG`
//! 3. `~/.reposcope/config.toml` (`%LOCALAPPDATA%\reposcope\config.toml` on Windows)
//! 4. Built-in defaults
//!
//! ```toml
//! # Serve cached content for up to two minutes
//! max_age_secs = 120
//!
//! # Show errors before spinners when nothing has loaded yet
//! priority = ["any-data", "error", "loading"]
//!
//! [transport]
//! base_url = "https://api.github.com"
//! timeout_secs = 30
//! ```
//!
//! The API token is never required. When `transport.token` is unset,
//! `$GITHUB_TOKEN` is used if present.

mod global;

pub use global::{ScopeConfig, TransportConfig, expand_path};
