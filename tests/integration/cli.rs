//! The `reposcope` binary against fixture files.

use assert_cmd::Command;
use predicates::prelude::*;
use reposcope::test_utils::demo_fixture;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_fixture(dir: &Path) -> PathBuf {
    let path = dir.join("fixture.json");
    let content = serde_json::to_string_pretty(&demo_fixture("octo", "demo", 10)).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// A command isolated from the user's configuration and token.
fn reposcope(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("reposcope").unwrap();
    cmd.env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("REPOSCOPE_CONFIG")
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_view_renders_repository() {
    let temp = TempDir::new().unwrap();
    let fixture = write_fixture(temp.path());

    reposcope(temp.path())
        .args(["view", "octo/demo", "--no-progress", "--fixture"])
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("octo/demo"))
        .stdout(predicate::str::contains("Rust 75.0%"))
        .stdout(predicate::str::contains("alice (42)"))
        .stdout(predicate::str::contains("not starred"));
}

#[test]
fn test_view_json() {
    let temp = TempDir::new().unwrap();
    let fixture = write_fixture(temp.path());

    let output = reposcope(temp.path())
        .args(["view", "https://github.com/octo/demo", "--json", "--fixture"])
        .arg(&fixture)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["repository"]["stargazers_count"], 10);
    assert_eq!(json["starred"], false);
    assert_eq!(json["languages"]["Shell"], 2500);
    assert_eq!(json["status"], "any-data");
    assert_eq!(json["errors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn test_star_json() {
    let temp = TempDir::new().unwrap();
    let fixture = write_fixture(temp.path());

    let output = reposcope(temp.path())
        .args(["star", "octo/demo", "--json", "--fixture"])
        .arg(&fixture)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["starred"], true);
    assert_eq!(json["repository"]["stargazers_count"], 11);
}

#[test]
fn test_star_prints_confirmation() {
    let temp = TempDir::new().unwrap();
    let fixture = write_fixture(temp.path());

    reposcope(temp.path())
        .args(["star", "octo/demo", "--no-progress", "--optimistic", "--fixture"])
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("Starred octo/demo"))
        .stdout(predicate::str::contains("starred by you"));
}

#[test]
fn test_missing_repository_fails() {
    let temp = TempDir::new().unwrap();
    let fixture = write_fixture(temp.path());

    reposcope(temp.path())
        .args(["view", "octo/missing", "--no-progress", "--fixture"])
        .arg(&fixture)
        .assert()
        .failure()
        .stderr(predicate::str::contains("octo/missing not found"));
}

#[test]
fn test_invalid_slug_fails() {
    let temp = TempDir::new().unwrap();

    reposcope(temp.path())
        .args(["view", "not-a-repo", "--no-progress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid repository"));
}

#[test]
fn test_explicit_config_must_exist() {
    let temp = TempDir::new().unwrap();
    let fixture = write_fixture(temp.path());

    reposcope(temp.path())
        .args(["view", "octo/demo", "--no-progress", "--config"])
        .arg(temp.path().join("missing.toml"))
        .arg("--fixture")
        .arg(&fixture)
        .assert()
        .failure();
}
