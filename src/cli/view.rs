//! `reposcope view`: load and render one repository snapshot.

use anyhow::{Result, bail};
use clap::Args;

use super::CliConfig;
use super::common::{SourceArgs, spinner};
use super::render::{render_snapshot, snapshot_json};
use crate::config::ScopeConfig;
use crate::graph::{GraphSnapshot, ObservationGraph};
use crate::repo::{RepoSlug, repository_resolver_for};

/// Show a repository with its contributors, languages and starred state.
#[derive(Args, Debug)]
pub struct ViewCommand {
    /// Repository as owner/name.
    repo: String,

    /// Print the snapshot as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    source: SourceArgs,
}

impl ViewCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let slug: RepoSlug = self.repo.parse()?;
        let config = ScopeConfig::load_with_optional(cli.config_path.clone()).await?;
        let engine = self.source.build_engine(&config).await?;

        let resolver = repository_resolver_for(&config.transport.base_url);
        let graph = engine.graph(slug.root_key(), resolver);
        let snapshot = load(&graph, &slug, cli.no_progress || self.json).await;
        graph.close().await;
        let snapshot = snapshot?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&snapshot_json(&snapshot))?);
        } else {
            println!("{}", render_snapshot(&slug, &snapshot));
        }
        Ok(())
    }
}

/// Bring `graph` up to date and return its snapshot, failing only when the
/// root itself is unavailable.
pub(super) async fn load(
    graph: &ObservationGraph,
    slug: &RepoSlug,
    quiet: bool,
) -> Result<GraphSnapshot> {
    let progress = spinner(format!("Loading {slug}"), quiet);
    let report = graph.ensure_fresh().await;
    progress.finish_and_clear();

    for error in report.errors() {
        tracing::debug!("{error}");
    }

    let snapshot = graph.snapshot();
    if snapshot.root_content().is_none() {
        if let Some(error) = report.root.error() {
            return Err(error.clone().into());
        }
        bail!("Repository {slug} not found");
    }
    Ok(snapshot)
}
