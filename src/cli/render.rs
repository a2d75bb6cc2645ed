//! Terminal and JSON rendering of repository snapshots.

use colored::Colorize;
use serde_json::{Value, json};
use std::fmt::Write;

use crate::graph::{GraphSnapshot, HandleView};
use crate::repo::{CONTRIBUTORS, LANGUAGES, RepoSlug, STARRED, is_starred, stargazers};
use crate::status::StatusKind;

const MAX_CONTRIBUTORS: usize = 5;

/// Human-readable summary of a repository snapshot.
pub fn render_snapshot(slug: &RepoSlug, snapshot: &GraphSnapshot) -> String {
    let mut out = String::new();
    let root = snapshot.root_content();

    let title = root
        .and_then(|repo| repo.get("full_name"))
        .and_then(Value::as_str)
        .map_or_else(|| slug.to_string(), str::to_string);
    let _ = writeln!(out, "{}", title.bold());

    let description = root.and_then(|repo| repo.get("description")).and_then(Value::as_str);
    if let Some(description) = description {
        let _ = writeln!(out, "{description}");
    }

    let stars = stargazers(root).map_or_else(|| "?".to_string(), |count| count.to_string());
    let starred = if is_starred(snapshot.derived_content(STARRED)) {
        "starred by you".yellow().to_string()
    } else {
        "not starred".dimmed().to_string()
    };
    let _ = writeln!(out, "★ {stars} ({starred})");

    if let Some(languages) = language_shares(snapshot.derived_content(LANGUAGES)) {
        let listed: Vec<_> = languages
            .iter()
            .map(|(name, share)| format!("{name} {share:.1}%"))
            .collect();
        let _ = writeln!(out, "{}: {}", "Languages".cyan(), listed.join(", "));
    }

    if let Some(contributors) = snapshot.derived_content(CONTRIBUTORS).and_then(Value::as_array) {
        let listed: Vec<_> = contributors
            .iter()
            .take(MAX_CONTRIBUTORS)
            .filter_map(|contributor| {
                let login = contributor.get("login")?.as_str()?;
                Some(match contributor.get("contributions").and_then(Value::as_u64) {
                    Some(count) => format!("{login} ({count})"),
                    None => login.to_string(),
                })
            })
            .collect();
        let more = contributors.len().saturating_sub(MAX_CONTRIBUTORS);
        let suffix = if more > 0 { format!(" and {more} more") } else { String::new() };
        let _ = writeln!(out, "{}: {}{suffix}", "Contributors".cyan(), listed.join(", "));
    }

    for view in std::iter::once(&snapshot.root).chain(snapshot.derived.values().flatten()) {
        if let Some(error) = &view.state.last_error {
            let _ = writeln!(out, "{}: {error}", "warning".yellow());
        }
    }

    let _ = write!(out, "{}", status_line(snapshot.status.display).dimmed());
    out
}

fn status_line(display: Option<StatusKind>) -> String {
    match display {
        Some(StatusKind::AnyData) => "status: data".to_string(),
        Some(StatusKind::Loading) => "status: loading".to_string(),
        Some(StatusKind::Error) => "status: error".to_string(),
        None => "status: empty".to_string(),
    }
}

/// Languages sorted by share, largest first.
fn language_shares(languages: Option<&Value>) -> Option<Vec<(String, f64)>> {
    let languages = languages?.as_object()?;
    let total = languages
        .values()
        .filter_map(Value::as_u64)
        .fold(0u64, u64::saturating_add);
    if total == 0 {
        return None;
    }

    let mut shares: Vec<_> = languages
        .iter()
        .filter_map(|(name, bytes)| {
            #[allow(clippy::cast_precision_loss)]
            let share = bytes.as_u64()? as f64 * 100.0 / total as f64;
            Some((name.clone(), share))
        })
        .collect();
    shares.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Some(shares)
}

/// Machine-readable form of a snapshot.
pub fn snapshot_json(snapshot: &GraphSnapshot) -> Value {
    let content = |view: Option<&HandleView>| view.and_then(HandleView::content).cloned();
    let errors: Vec<String> = std::iter::once(&snapshot.root)
        .chain(snapshot.derived.values().flatten())
        .filter_map(|view| view.state.last_error.as_ref().map(ToString::to_string))
        .collect();

    json!({
        "repository": snapshot.root_content(),
        "starred": is_starred(snapshot.derived_content(STARRED)),
        "languages": content(snapshot.derived(LANGUAGES)),
        "contributors": content(snapshot.derived(CONTRIBUTORS)),
        "status": snapshot.status.display,
        "errors": errors,
    })
}
