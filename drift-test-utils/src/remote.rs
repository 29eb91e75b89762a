//! Working copies with a bare `origin` remote
//!
//! [`OriginFixture`] pairs a working copy with a bare repository registered as
//! its `origin`, so fetch, pull, and ahead/behind counting can be exercised
//! against a real transport without touching the network.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::{Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

use crate::git::{create_commit, init_repository};

pub struct OriginFixture {
  /// The working copy
  pub repo: Repository,
  /// The bare repository registered as `origin`
  pub origin: Repository,
  path: PathBuf,
  origin_dir: TempDir,
  work_dir: Option<TempDir>,
}

impl OriginFixture {
  /// Working copy in its own temporary directory
  pub fn new() -> Self {
    let work_dir = TempDir::new().expect("Failed to create temporary directory");
    let path = work_dir.path().to_path_buf();
    Self::create(path, Some(work_dir)).expect("Failed to create origin fixture")
  }

  /// Working copy at `<parent>/<name>`; the caller owns `parent`
  pub fn new_in(parent: &Path, name: &str) -> Self {
    let path = parent.join(name);
    std::fs::create_dir_all(&path).expect("Failed to create working copy directory");
    Self::create(path, None).expect("Failed to create origin fixture")
  }

  fn create(path: PathBuf, work_dir: Option<TempDir>) -> Result<Self> {
    let origin_dir = TempDir::new()?;
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    let origin = Repository::init_opts(origin_dir.path(), &opts)?;

    let repo = init_repository(&path)?;
    let url = origin_dir.path().to_string_lossy().into_owned();
    repo.remote("origin", &url)?;

    Ok(Self {
      repo,
      origin,
      path,
      origin_dir,
      work_dir,
    })
  }

  /// Get the path to the working copy
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Get the path to the bare origin
  pub fn origin_path(&self) -> &Path {
    self.origin_dir.path()
  }

  /// Commit a file on the checked-out branch of the working copy
  pub fn commit(&self, file_name: &str, content: &str, message: &str) -> Result<()> {
    create_commit(&self.repo, file_name, content, message)
  }

  /// Push local `branch` to origin and fetch, so `origin/<branch>` exists
  pub fn publish(&self, branch: &str) -> Result<()> {
    let mut remote = self.repo.find_remote("origin")?;
    let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
    remote
      .push(&[refspec.as_str()], None)
      .with_context(|| format!("Failed to push {branch} to origin"))?;
    self.fetch()
  }

  /// Update the remote-tracking refs of the working copy
  pub fn fetch(&self) -> Result<()> {
    let mut remote = self.repo.find_remote("origin")?;
    remote.fetch(&[] as &[&str], None, None)?;
    Ok(())
  }

  /// Commit a file directly on `branch` in the bare origin, as if someone
  /// else had pushed
  pub fn commit_on_origin(&self, branch: &str, file_name: &str, content: &str, message: &str) -> Result<()> {
    let refname = format!("refs/heads/{branch}");
    let parent = self
      .origin
      .find_reference(&refname)
      .and_then(|reference| reference.peel_to_commit())
      .with_context(|| format!("origin has no branch {branch}"))?;

    let blob = self.origin.blob(content.as_bytes())?;
    let parent_tree = parent.tree()?;
    let mut builder = self.origin.treebuilder(Some(&parent_tree))?;
    builder.insert(file_name, blob, 0o100644)?;
    let tree = self.origin.find_tree(builder.write()?)?;

    let signature = Signature::now("Someone Else", "someone@example.com")?;
    self
      .origin
      .commit(Some(&refname), &signature, &signature, message, &tree, &[&parent])?;
    Ok(())
  }
}

impl Default for OriginFixture {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn publish_creates_remote_tracking_branch() {
    let fixture = OriginFixture::new();
    fixture.commit("README.md", "hello\n", "initial").unwrap();
    fixture.publish("main").unwrap();

    let local = fixture.repo.refname_to_id("refs/heads/main").unwrap();
    let tracking = fixture.repo.refname_to_id("refs/remotes/origin/main").unwrap();
    assert_eq!(local, tracking);
    assert_eq!(fixture.origin.refname_to_id("refs/heads/main").unwrap(), local);
  }

  #[test]
  fn commit_on_origin_is_visible_after_fetch() {
    let fixture = OriginFixture::new();
    fixture.commit("README.md", "hello\n", "initial").unwrap();
    fixture.publish("main").unwrap();
    fixture.commit_on_origin("main", "remote.txt", "theirs\n", "remote").unwrap();

    let before = fixture.repo.refname_to_id("refs/remotes/origin/main").unwrap();
    fixture.fetch().unwrap();
    let after = fixture.repo.refname_to_id("refs/remotes/origin/main").unwrap();
    assert_ne!(before, after);
  }

  #[test]
  fn new_in_places_working_copy_under_parent() {
    let parent = TempDir::new().unwrap();
    let fixture = OriginFixture::new_in(parent.path(), "service");
    assert_eq!(fixture.path(), parent.path().join("service"));
    assert!(fixture.path().join(".git").exists());
  }
}
