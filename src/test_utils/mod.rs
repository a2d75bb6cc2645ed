//! Test utilities for reposcope
//!
//! Helpers shared by the unit tests and the `integration` test target
//! (enabled there through the `test-utils` feature): one-time tracing setup
//! and canned repository content for [`MemoryTransport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use reposcope::test_utils::{demo_transport, init_test_logging};
//!
//! init_test_logging(None);
//! let transport = demo_transport("octo", "demo", 10);
//! assert_eq!(transport.total_fetches(), 0);
//! ```

use serde_json::{Value, json};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::transport::MemoryTransport;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `level` set, that level is used;
/// otherwise logging is enabled only when `RUST_LOG` is set.
///
/// ```bash
/// RUST_LOG=coordinator=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// Repository content as the API returns it, trimmed to the fields the
/// resolver and renderer read.
pub fn repo_json(owner: &str, name: &str, stars: u64) -> Value {
    let base = format!("https://api.github.com/repos/{owner}/{name}");
    json!({
        "full_name": format!("{owner}/{name}"),
        "description": format!("The {name} repository"),
        "stargazers_count": stars,
        "contributors_url": format!("{base}/contributors"),
        "languages_url": format!("{base}/languages"),
    })
}

/// A transport serving one repository with two contributors, two languages
/// and no star.
///
/// Keys: `repos/{owner}/{name}`, `.../contributors`, `.../languages`, and
/// `user/starred/{owner}/{name}` holding `false` the way the HTTP transport
/// reports an unstarred repository.
pub fn demo_transport(owner: &str, name: &str, stars: u64) -> MemoryTransport {
    let transport = MemoryTransport::new();
    let root = format!("repos/{owner}/{name}");
    transport.insert(root.as_str(), repo_json(owner, name, stars));
    transport.insert(
        format!("{root}/contributors"),
        json!([
            {"login": "alice", "contributions": 42},
            {"login": "bob", "contributions": 7}
        ]),
    );
    transport.insert(format!("{root}/languages"), json!({"Rust": 7500, "Shell": 2500}));
    transport.insert(format!("user/starred/{owner}/{name}"), json!(false));
    transport
}

/// The same content as [`demo_transport`] in the fixture file format.
pub fn demo_fixture(owner: &str, name: &str, stars: u64) -> Value {
    let root = format!("repos/{owner}/{name}");
    json!({
        "resources": {
            root.clone(): repo_json(owner, name, stars),
            format!("{root}/contributors"): [
                {"login": "alice", "contributions": 42},
                {"login": "bob", "contributions": 7}
            ],
            format!("{root}/languages"): {"Rust": 7500, "Shell": 2500},
            format!("user/starred/{owner}/{name}"): false
        },
        "writes": {
            format!("user/starred/{owner}/{name}"): {"stargazers_count": stars + 1}
        }
    })
}
