//! Global constants used throughout the reposcope codebase.
//!
//! Timeouts, freshness windows and channel sizes that are shared between the
//! coordinator, the observation graphs and the CLI live here so the magic
//! numbers stay discoverable.

use std::time::Duration;

use crate::status::StatusKind;

/// Default maximum age of cached content before "load if needed" refetches (60 seconds).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

/// Default upper bound for a single transport call (30 seconds).
///
/// An elapsed timeout is reported as a transport error on the affected handle.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the command channel feeding each graph driver.
pub const GRAPH_COMMAND_BUFFER: usize = 32;

/// Display priority used when none is configured: partial data beats a spinner.
pub const DEFAULT_PRIORITY: [StatusKind; 3] =
    [StatusKind::AnyData, StatusKind::Loading, StatusKind::Error];

/// Default API root for the HTTP transport.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// User agent sent by the HTTP transport unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = concat!("reposcope/", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "REPOSCOPE_CONFIG";

/// Environment variable supplying an API token when the config has none.
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";
