use std::fs;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use drift_test_utils::OriginFixture;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn drift(config_home: &Path) -> Command {
  let mut cmd = cargo_bin_cmd!("drift");
  cmd
    .env("XDG_CONFIG_HOME", config_home)
    .env_remove("GIT_FETCH_CACHE_SECONDS")
    .env_remove("DRIFT_JOBS")
    .arg("--colors")
    .arg("never");
  cmd
}

/// A parent directory holding a clean repository, a dirty one, and a plain
/// directory that is not a repository
struct Workspace {
  parent: TempDir,
  _clean: OriginFixture,
  _dirty: OriginFixture,
}

fn workspace() -> Workspace {
  let parent = TempDir::new().unwrap();

  let clean = OriginFixture::new_in(parent.path(), "clean");
  clean.commit("README.md", "clean\n", "initial commit").unwrap();
  clean.publish("main").unwrap();

  let dirty = OriginFixture::new_in(parent.path(), "dirty");
  dirty.commit("README.md", "dirty\n", "initial commit").unwrap();
  dirty.publish("main").unwrap();
  dirty.commit("extra.txt", "more\n", "local work").unwrap();
  fs::write(dirty.path().join("scratch.txt"), "untracked\n").unwrap();

  fs::create_dir(parent.path().join("notes")).unwrap();

  Workspace {
    parent,
    _clean: clean,
    _dirty: dirty,
  }
}

#[test]
fn json_output_is_sorted_with_dirty_repositories_first() {
  let config = TempDir::new().unwrap();
  let workspace = workspace();

  let output = drift(config.path())
    .arg("scan")
    .arg(workspace.parent.path())
    .arg("--format")
    .arg("json")
    .output()
    .unwrap();
  assert!(output.status.success());

  let records: Value = serde_json::from_slice(&output.stdout).unwrap();
  let records = records.as_array().unwrap();
  let names: Vec<&str> = records.iter().map(|record| record["name"].as_str().unwrap()).collect();
  assert_eq!(names, ["dirty", "clean"]);

  let dirty = &records[0];
  assert_eq!(dirty["branch"], "main");
  assert_eq!(dirty["remote_branch"], "origin/main");
  assert_eq!(dirty["divergence"]["ahead"], 1);
  assert_eq!(dirty["divergence"]["behind"], 0);
  assert_eq!(dirty["working_tree"]["untracked"], 1);
  assert_eq!(dirty["fetch_cached"], false);
  assert!(dirty["last_commit"].is_string());
}

#[test]
fn text_output_renders_table() {
  let config = TempDir::new().unwrap();
  let workspace = workspace();

  drift(config.path())
    .arg("scan")
    .arg(workspace.parent.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Repo"))
    .stdout(predicate::str::contains("Last Commit"))
    .stdout(predicate::str::contains("clean"))
    .stdout(predicate::str::contains("dirty"))
    .stdout(predicate::str::contains("notes").not())
    .stdout(predicate::str::contains("Pull").not());
}

#[test]
fn second_scan_is_served_from_cache() {
  let config = TempDir::new().unwrap();
  let workspace = workspace();

  drift(config.path())
    .arg("scan")
    .arg(workspace.parent.path())
    .assert()
    .success();

  let output = drift(config.path())
    .arg("scan")
    .arg(workspace.parent.path())
    .arg("--format")
    .arg("json")
    .output()
    .unwrap();
  let records: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(
    records
      .as_array()
      .unwrap()
      .iter()
      .all(|record| record["fetch_cached"] == true)
  );

  let output = drift(config.path())
    .arg("scan")
    .arg(workspace.parent.path())
    .arg("--no-cache")
    .arg("--format")
    .arg("json")
    .output()
    .unwrap();
  let records: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(
    records
      .as_array()
      .unwrap()
      .iter()
      .all(|record| record["fetch_cached"] == false)
  );
}

#[test]
fn pull_adds_pull_column() {
  let config = TempDir::new().unwrap();
  let workspace = workspace();

  drift(config.path())
    .arg("scan")
    .arg(workspace.parent.path())
    .arg("--pull")
    .arg("--jobs")
    .arg("1")
    .assert()
    .success()
    .stdout(predicate::str::contains("Pull"))
    .stdout(predicate::str::contains("Already up to date."));
}

#[test]
fn empty_parent_reports_no_repositories() {
  let config = TempDir::new().unwrap();
  let parent = TempDir::new().unwrap();

  drift(config.path())
    .arg("scan")
    .arg(parent.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("No git repositories found"));
}

#[test]
fn missing_parent_is_an_error() {
  let config = TempDir::new().unwrap();
  let missing = config.path().join("missing");

  drift(config.path())
    .arg("scan")
    .arg(&missing)
    .assert()
    .failure()
    .stdout(predicate::str::contains("does not exist."));
}
