//! Command-line interface for reposcope.
//!
//! # Available Commands
//!
//! - `view` - Load a repository with its contributors, languages and starred
//!   state, and render one snapshot
//! - `star` - Star or unstar a repository and render the updated snapshot
//!
//! Both commands talk to the configured API through the HTTP transport, or
//! serve a JSON fixture from memory with `--fixture`.
//!
//! # Global Options
//!
//! - `-v, --verbose` - Debug logging on stderr
//! - `-q, --quiet` - No logging at all
//! - `-c, --config <PATH>` - Configuration file (see [`crate::config`])
//! - `--no-progress` - Disable spinners
//!
//! # Examples
//!
//! ```bash
//! reposcope view rust-lang/rust
//! reposcope --verbose star tokio-rs/tokio
//! reposcope star tokio-rs/tokio --undo
//! reposcope view octo/demo --fixture demos/octo-demo.json --json
//! ```

mod common;
mod render;
mod star;
mod view;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use common::SourceArgs;

/// Settings derived from the global flags, passed to every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter directive; `None` disables logging.
    pub log_level: Option<String>,
    /// Whether spinners are disabled.
    pub no_progress: bool,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Install the global tracing subscriber on stderr.
    ///
    /// `RUST_LOG` wins over the default level but not over `--verbose`.
    pub fn init_logging(&self, verbose: bool) {
        let Some(level) = &self.log_level else {
            return;
        };
        let filter = if verbose {
            EnvFilter::new(level)
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    }
}

/// Observe repositories and their derived resources.
#[derive(Parser)]
#[command(
    name = "reposcope",
    about = "Observe a repository together with its contributors, languages and starred state",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging on stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress everything except errors and the rendered result.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file (default: ~/.reposcope/config.toml).
    #[arg(short, long, global = true, env = "REPOSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Disable spinners.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a repository snapshot.
    View(view::ViewCommand),

    /// Star or unstar a repository.
    Star(star::StarCommand),
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging(self.verbose);
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration, skipping logging setup.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::View(cmd) => cmd.execute(&config).await,
            Commands::Star(cmd) => cmd.execute(&config).await,
        }
    }
}
