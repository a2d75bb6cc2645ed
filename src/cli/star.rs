//! `reposcope star`: star or unstar a repository.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::{SourceArgs, spinner};
use super::render::{render_snapshot, snapshot_json};
use super::view::load;
use crate::config::ScopeConfig;
use crate::mutation::MutationMode;
use crate::repo::{RepoSlug, repository_resolver_for, star_request};

/// Star a repository (or unstar it with `--undo`).
#[derive(Args, Debug)]
pub struct StarCommand {
    /// Repository as owner/name.
    repo: String,

    /// Remove the star instead.
    #[arg(long)]
    undo: bool,

    /// Show the new state before the server confirms it.
    #[arg(long)]
    optimistic: bool,

    /// Print the resulting snapshot as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    source: SourceArgs,
}

impl StarCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let slug: RepoSlug = self.repo.parse()?;
        let config = ScopeConfig::load_with_optional(cli.config_path.clone()).await?;
        let engine = self.source.build_engine(&config).await?;
        let quiet = cli.no_progress || self.json;

        let resolver = repository_resolver_for(&config.transport.base_url);
        let graph = engine.graph(slug.root_key(), resolver);
        if let Err(error) = load(&graph, &slug, quiet).await {
            graph.close().await;
            return Err(error);
        }

        let star = !self.undo;
        let mode = if self.optimistic { MutationMode::Optimistic } else { MutationMode::Confirmed };
        let message = if star {
            format!("Starring {slug}")
        } else {
            format!("Unstarring {slug}")
        };
        let progress = spinner(message, quiet);
        let event = graph.perform_mutation(star_request(&slug, star).with_mode(mode)).await;
        progress.finish_and_clear();

        // Mutations land in the shared handles; this only republishes them
        let snapshot = load(&graph, &slug, true).await;
        graph.close().await;
        if let Some(error) = event.error() {
            return Err(error.clone().into());
        }
        let snapshot = snapshot?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&snapshot_json(&snapshot))?);
        } else {
            let verb = if star { "Starred" } else { "Unstarred" };
            println!("{} {slug}", verb.green().bold());
            println!("{}", render_snapshot(&slug, &snapshot));
        }
        Ok(())
    }
}
