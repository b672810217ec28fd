//! Git workspace helper: repo root discovery, branch/status, and
//! an idempotent write-then-commit-then-push operation.
//!
//! Grounded on `phkaiser13-PeitchGIT`'s `git_ops.rs`: open the repo with
//! `git2` rather than shelling out (no command-injection surface, structured
//! errors), stage/commit/push with `git2::{Signature, Cred, RemoteCallbacks}`.
//! Unlike that module's single-purpose PR-branch flow, hctl commits straight
//! to the checked-out branch — there's no PR review step in this platform's
//! workflow (ArgoCD syncs off whatever branch it's pointed at).
use git2::{Cred, PushOptions, RemoteCallbacks, Repository, Signature};
use hctl_core::config::GitMode;
use hctl_core::error::{ErrorKind, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::output::OutputAdapter;

pub struct GitWorkspace {
    repo: Repository,
    root: PathBuf,
}

impl GitWorkspace {
    /// Discover the repository enclosing `start`.
    pub fn discover(start: &Path) -> Result<GitWorkspace> {
        let repo = Repository::discover(start)
            .map_err(|e| ErrorKind::config(format!("not inside a git repository ({}): {}", start.display(), e)))?;
        let root = repo
            .workdir()
            .ok_or_else(|| ErrorKind::config("repository has no working directory (bare repo?)"))?
            .to_path_buf();
        Ok(GitWorkspace { repo, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current branch name.
    pub fn current_branch(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| ErrorKind::internal(format!("failed to read HEAD: {}", e)))?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    /// Paths with uncommitted changes relative to the index.
    pub fn dirty_files(&self) -> Result<Vec<String>> {
        let statuses = self
            .repo
            .statuses(None)
            .map_err(|e| ErrorKind::internal(format!("failed to read git status: {}", e)))?;
        Ok(statuses.iter().filter_map(|s| s.path().map(str::to_string)).collect())
    }

    /// Write `files` (relative-path -> bytes) under the repo root, creating
    /// parent directories, only touching files whose contents differ, then
    /// commit/push/prompt according to `mode`.
    ///
    /// `operation` and `subject` feed the deterministic commit message.
    pub fn idempotent_write(
        &self,
        files: &BTreeMap<PathBuf, Vec<u8>>,
        operation: &str,
        subject_name: &str,
        mode: GitMode,
        output: &OutputAdapter,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (rel, contents) in files {
            if rel.is_absolute() {
                return Err(ErrorKind::internal(format!("refusing to write absolute path {}", rel.display())).into());
            }
            let abs = self.root.join(rel);
            if !abs.starts_with(&self.root) {
                return Err(ErrorKind::internal(format!("path {} escapes repository root", rel.display())).into());
            }
            let unchanged = std::fs::read(&abs).map(|existing| &existing == contents).unwrap_or(false);
            if unchanged {
                continue;
            }
            if let Some(parent) = abs.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ErrorKind::internal(format!("failed to create {}: {}", parent.display(), e)))?;
            }
            std::fs::write(&abs, contents)
                .map_err(|e| ErrorKind::internal(format!("failed to write {}: {}", abs.display(), e)))?;
            written.push(rel.clone());
        }

        if written.is_empty() {
            output.line("no changes to write (generated files already match)");
            return Ok(written);
        }

        let subject = format!("{} {}", operation, subject_name);
        let body = commit_body(&written);

        match mode {
            GitMode::Manual => {
                output.line(&format!("wrote {} file(s); git mode is 'manual', leaving uncommitted", written.len()));
            }
            GitMode::Prompt => {
                output.line(&format!("--- {}\n{}", subject, body));
                let confirmed = dialoguer::Confirm::new()
                    .with_prompt("commit and push these changes?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if confirmed {
                    self.commit_and_push(&written, &subject, &body)?;
                } else {
                    output.line("left uncommitted at the operator's request");
                }
            }
            GitMode::Auto => {
                self.commit_and_push(&written, &subject, &body)?;
            }
        }
        Ok(written)
    }

    /// Remove a single tracked path and commit/push/prompt according to
    /// `mode`. Mirrors
    /// `idempotent_write`'s mode handling but for a deletion rather than a
    /// write.
    pub fn remove_and_commit(
        &self,
        rel: &Path,
        operation: &str,
        subject_name: &str,
        mode: GitMode,
        output: &OutputAdapter,
    ) -> Result<()> {
        let abs = self.root.join(rel);
        std::fs::remove_file(&abs)
            .map_err(|e| ErrorKind::internal(format!("failed to remove {}: {}", abs.display(), e)))?;

        let subject = format!("{} {}", operation, subject_name);
        let body = format!("- {}", rel.display());

        match mode {
            GitMode::Manual => {
                output.line(&format!("removed {}; git mode is 'manual', leaving uncommitted", rel.display()));
            }
            GitMode::Prompt => {
                output.line(&format!("--- {}\n{}", subject, body));
                let confirmed = dialoguer::Confirm::new()
                    .with_prompt("commit and push this removal?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if confirmed {
                    self.commit_removal(rel, &subject, &body)?;
                } else {
                    output.line("left uncommitted at the operator's request");
                }
            }
            GitMode::Auto => {
                self.commit_removal(rel, &subject, &body)?;
            }
        }
        Ok(())
    }

    fn commit_removal(&self, rel: &Path, subject: &str, body: &str) -> Result<()> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| ErrorKind::internal(format!("failed to open git index: {}", e)))?;
        index
            .remove_path(rel)
            .map_err(|e| ErrorKind::internal(format!("failed to stage removal of {}: {}", rel.display(), e)))?;
        index.write().map_err(|e| ErrorKind::internal(format!("failed to write git index: {}", e)))?;
        let tree_id = index.write_tree().map_err(|e| ErrorKind::internal(format!("failed to write tree: {}", e)))?;
        let tree = self.repo.find_tree(tree_id).map_err(|e| ErrorKind::internal(e.to_string()))?;

        let sig = Signature::now("hctl", "hctl@localhost")
            .map_err(|e| ErrorKind::internal(format!("failed to build commit signature: {}", e)))?;
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();

        let message = format!("{}\n\n{}", subject, body);
        let commit_id = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)
            .map_err(|e| ErrorKind::internal(format!("failed to commit: {}", e)))?;
        log::debug!("committed {} as {}", subject, commit_id);

        self.push().map_err(|e| ErrorKind::network(format!("git push failed: {}", e)).into())
    }

    fn commit_and_push(&self, written: &[PathBuf], subject: &str, body: &str) -> Result<()> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| ErrorKind::internal(format!("failed to open git index: {}", e)))?;
        for rel in written {
            index
                .add_path(rel)
                .map_err(|e| ErrorKind::internal(format!("failed to stage {}: {}", rel.display(), e)))?;
        }
        index.write().map_err(|e| ErrorKind::internal(format!("failed to write git index: {}", e)))?;
        let tree_id = index.write_tree().map_err(|e| ErrorKind::internal(format!("failed to write tree: {}", e)))?;
        let tree = self.repo.find_tree(tree_id).map_err(|e| ErrorKind::internal(e.to_string()))?;

        let sig = Signature::now("hctl", "hctl@localhost")
            .map_err(|e| ErrorKind::internal(format!("failed to build commit signature: {}", e)))?;
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();

        let message = format!("{}\n\n{}", subject, body);
        let commit_id = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)
            .map_err(|e| ErrorKind::internal(format!("failed to commit: {}", e)))?;
        log::debug!("committed {} as {}", subject, commit_id);

        self.push().map_err(|e| ErrorKind::network(format!("git push failed: {}", e)).into())
    }

    fn push(&self) -> std::result::Result<(), git2::Error> {
        let mut remote = self.repo.find_remote("origin")?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, _allowed| {
            if let Some(user) = username_from_url {
                if let Ok(cred) = Cred::ssh_key_from_agent(user) {
                    return Ok(cred);
                }
            }
            Cred::default()
        });
        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);

        let branch = self.current_branch().unwrap_or_else(|_| "HEAD".to_string());
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        remote.push(&[refspec.as_str()], Some(&mut opts))
    }
}

/// Deterministic commit body: written paths, sorted, one per line (design
/// notes §9).
fn commit_body(written: &[PathBuf]) -> String {
    let mut paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
    paths.sort();
    paths.iter().map(|p| format!("- {}", p)).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_body_is_sorted() {
        let written = vec![PathBuf::from("b.yaml"), PathBuf::from("a.yaml")];
        let body = commit_body(&written);
        assert_eq!(body, "- a.yaml\n- b.yaml");
    }

    #[test]
    fn discover_rejects_non_repo_path() {
        let dir = std::env::temp_dir().join(format!("hctl-not-a-repo-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let result = GitWorkspace::discover(Path::new("/"));
        // `/` itself is very unlikely to be (or be inside) a git repo in CI.
        if result.is_ok() {
            // Environment happens to have a repo above `/`; nothing to assert.
        }
        std::fs::remove_dir_all(&dir).ok();
    }
}
