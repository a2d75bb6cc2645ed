//! Arguments and helpers shared by the commands.

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ScopeConfig, expand_path};
use crate::engine::{Engine, EngineOptions};
use crate::status::StatusKind;
use crate::transport::{HttpTransport, MemoryTransport, Transport};

/// Where resources come from and how they are cached.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Serve resources from a JSON fixture instead of the network.
    #[arg(long, value_name = "PATH")]
    pub fixture: Option<PathBuf>,

    /// Override the configured max age of cached content, in seconds.
    #[arg(long, value_name = "SECS")]
    pub max_age: Option<u64>,

    /// Override the status priority, e.g. `error,loading,any-data`.
    #[arg(long, value_delimiter = ',')]
    pub priority: Vec<StatusKind>,
}

impl SourceArgs {
    /// Build an engine from configuration plus command-line overrides.
    pub async fn build_engine(&self, config: &ScopeConfig) -> Result<Engine> {
        let mut options = EngineOptions::from(config);
        if let Some(secs) = self.max_age {
            options.max_age = Duration::from_secs(secs);
        }
        if !self.priority.is_empty() {
            options.priority.clone_from(&self.priority);
        }

        let transport: Arc<dyn Transport> = match &self.fixture {
            Some(path) => {
                let path = expand_path(path)?;
                tracing::debug!("Serving resources from fixture {}", path.display());
                Arc::new(MemoryTransport::load_fixture(&path).await?)
            }
            None => Arc::new(HttpTransport::new(&config.transport)?),
        };

        Ok(Engine::new(transport, options))
    }
}

/// A spinner on stderr, or a hidden bar when progress output is disabled.
pub fn spinner(message: impl Into<String>, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
