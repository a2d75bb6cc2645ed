//! User-wide configuration (`~/.reposcope/config.toml`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    CONFIG_ENV_VAR, DEFAULT_BASE_URL, DEFAULT_MAX_AGE, DEFAULT_PRIORITY, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_USER_AGENT, TOKEN_ENV_VAR,
};
use crate::handle::StalenessPolicy;
use crate::status::{StatusAggregator, StatusKind};

/// Settings for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// API root that resource keys are relative to.
    pub base_url: String,

    /// Bearer token. Falls back to `GITHUB_TOKEN` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// User agent sent with every request.
    pub user_agent: String,

    /// Upper bound for one request, in seconds.
    pub timeout_secs: u64,
}

impl TransportConfig {
    /// The request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// Top-level configuration.
///
/// Every key is optional:
///
/// ```toml
/// max_age_secs = 120
/// priority = ["any-data", "error", "loading"]
///
/// [transport]
/// base_url = "https://github.example.com/api/v3"
/// token = "ghp_xxxxxxxxxxxx"
/// timeout_secs = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// How long fetched content is served without a refetch, in seconds.
    pub max_age_secs: u64,

    /// Status display priority, highest first.
    pub priority: Vec<StatusKind>,

    /// HTTP transport settings.
    pub transport: TransportConfig,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_MAX_AGE.as_secs(),
            priority: DEFAULT_PRIORITY.to_vec(),
            transport: TransportConfig::default(),
        }
    }
}

impl ScopeConfig {
    /// Load from the first of: `path`, `$REPOSCOPE_CONFIG`, the default path.
    ///
    /// An explicitly requested file must exist. The default file is optional
    /// and falls back to [`ScopeConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An explicitly requested file does not exist or cannot be read
    /// - The file contains invalid TOML or unknown status kinds
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let explicit = path.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                let path = expand_path(&path)?;
                Self::load_from(&path).await?
            }
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from(&path).await?
                } else {
                    tracing::debug!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        if config.transport.token.is_none() {
            config.transport.token = std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        }
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// `~/.reposcope/config.toml`, or `%LOCALAPPDATA%\reposcope\config.toml` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("reposcope")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".reposcope")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Maximum age of cached content.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// The staleness policy for this configuration.
    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.max_age())
    }

    /// An aggregator using the configured priority.
    pub fn aggregator(&self) -> StatusAggregator {
        StatusAggregator::new(self.priority.iter().copied())
    }

    /// Upper bound for one transport call.
    pub fn request_timeout(&self) -> Duration {
        self.transport.timeout()
    }
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path: {}", path.display()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
