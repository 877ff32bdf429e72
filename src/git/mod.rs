//! Git operations wrapper for weave
//!
//! weave drives the system `git` binary instead of an embedded implementation, so it
//! works with whatever repository layout, configuration and object format the user's git
//! understands. All commands are async, run through [`GitCommand`], and log under the
//! `git` target.
//!
//! [`GitRepo`] exposes the handful of queries weave needs:
//!
//! - locating the repository root and repository-relative paths
//! - the last commit touching a file and the file's blob at a commit (render provenance)
//! - the commit log, per-commit changed files, and blob contents (history indexing)
//!
//! Log and diff output is requested in machine formats (`%x1f`/`%x1e` separated records,
//! `diff-tree -z`) so that paths and subjects never need quoting rules.

pub mod command_builder;

pub use command_builder::GitCommand;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::WeaveError;
use crate::fragment::to_slash;

/// Mode of gitlink (submodule) entries, which carry no blob.
const GITLINK_MODE: &str = "160000";

/// Metadata of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub parents: Vec<String>,
    pub date: DateTime<FixedOffset>,
    pub author: String,
    pub summary: String,
}

impl CommitInfo {
    /// Abbreviated commit id for display.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

/// Kind of change recorded by `git diff-tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Renamed,
    Copied,
    TypeChanged,
}

/// A file that has new content in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Repository path after the change
    pub path: String,
    /// Source path of a rename or copy
    pub previous_path: Option<String>,
    /// Object id of the new blob
    pub blob: String,
    pub kind: ChangeKind,
}

/// A git work tree.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Find the repository containing `path`.
    ///
    /// Fails with [`WeaveError::GitRepoInvalid`] when `path` is not inside a work tree and
    /// with [`WeaveError::GitNotFound`] when git is not installed.
    pub async fn discover(path: &Path) -> Result<Self> {
        let dir = if path.is_dir() { path } else { path.parent().unwrap_or(path) };
        let toplevel = GitCommand::show_toplevel().current_dir(dir).execute_stdout().await;
        match toplevel {
            Ok(root) => {
                let root = PathBuf::from(root);
                let root = root.canonicalize().unwrap_or(root);
                tracing::debug!(target: "git", "Repository root: {}", root.display());
                Ok(Self {
                    root,
                })
            }
            Err(e) if matches!(e.downcast_ref::<WeaveError>(), Some(WeaveError::GitNotFound)) => Err(e),
            Err(_) => Err(WeaveError::GitRepoInvalid {
                path: path.display().to_string(),
            }
            .into()),
        }
    }

    /// Use `root` as the repository root without asking git.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the repository root, `/`-separated.
    #[must_use]
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        path.strip_prefix(&self.root).ok().map(to_slash)
    }

    fn command(&self, cmd: GitCommand) -> GitCommand {
        cmd.current_dir(&self.root)
    }

    /// Full id of `reference`, or `None` if it does not name a commit.
    pub async fn resolve_commit(&self, reference: &str) -> Result<Option<String>> {
        match self.command(GitCommand::verify_commit(reference)).execute_stdout().await {
            Ok(id) if !id.is_empty() => Ok(Some(id)),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.downcast_ref::<WeaveError>(), Some(WeaveError::GitCommandError { .. })) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Last commit touching `repo_path`, or `None` if the file was never committed.
    pub async fn last_commit_for(&self, repo_path: &str) -> Result<Option<String>> {
        let id = self
            .command(GitCommand::last_commit(repo_path))
            .with_context("provenance")
            .execute_stdout()
            .await
            .with_context(|| format!("Failed to find the last commit of {repo_path}"))?;
        Ok((!id.is_empty()).then_some(id))
    }

    /// Raw contents of `repo_path` at `commit`.
    pub async fn show_blob(&self, commit: &str, repo_path: &str) -> Result<Vec<u8>> {
        self.command(GitCommand::cat_blob(commit, repo_path))
            .execute_bytes()
            .await
            .with_context(|| format!("Failed to read {repo_path} at {commit}"))
    }

    /// Every commit reachable from `HEAD` (or from all refs), oldest author date first.
    pub async fn commits(&self, all_refs: bool) -> Result<Vec<CommitInfo>> {
        let output = self
            .command(GitCommand::log_records(all_refs))
            .with_context("history")
            .execute()
            .await
            .context("Failed to list commits")?;
        let mut commits = parse_log(&output.stdout)?;
        commits.sort_by_key(|c| c.date);
        Ok(commits)
    }

    /// Files with new content in `commit`, compared with its first parent.
    pub async fn changes(&self, commit: &CommitInfo) -> Result<Vec<FileChange>> {
        let output = self
            .command(GitCommand::diff_tree(&commit.id, commit.parents.first().map(String::as_str)))
            .execute()
            .await
            .with_context(|| format!("Failed to list changes of {}", commit.short_id()))?;
        Ok(parse_raw_diff(&output.stdout))
    }
}

/// Parse `%H%x1f%P%x1f%aI%x1f%an%x1f%s%x1e` records.
pub fn parse_log(output: &str) -> Result<Vec<CommitInfo>> {
    let mut commits = Vec::new();
    for record in output.split('\x1e') {
        let record = record.trim_start_matches(['\n', '\r']);
        if record.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = record.split('\x1f').collect();
        let [id, parents, date, author, summary] = fields[..] else {
            return Err(WeaveError::GitCommandError {
                operation: "log".to_string(),
                stderr: format!("unexpected log record: {record:?}"),
            }
            .into());
        };
        let date = DateTime::parse_from_rfc3339(date.trim())
            .with_context(|| format!("Invalid author date '{date}' for commit {id}"))?;
        commits.push(CommitInfo {
            id: id.trim().to_string(),
            parents: parents.split_whitespace().map(str::to_string).collect(),
            date,
            author: author.to_string(),
            summary: summary.trim_end().to_string(),
        });
    }
    Ok(commits)
}

/// Parse `git diff-tree -r -M -z --raw` output.
///
/// Deletions and gitlinks are skipped; every other entry carries the blob of its new
/// content.
pub fn parse_raw_diff(output: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    let mut tokens = output.split('\0').filter(|t| !t.is_empty());

    while let Some(meta) = tokens.next() {
        let Some(meta) = meta.trim_start_matches('\n').strip_prefix(':') else {
            continue;
        };
        let fields: Vec<&str> = meta.split_whitespace().collect();
        let [_old_mode, new_mode, _old_blob, new_blob, status] = fields[..] else {
            continue;
        };
        let status = status.chars().next().unwrap_or('X');
        let (previous_path, path) = if matches!(status, 'R' | 'C') {
            (tokens.next().map(str::to_string), tokens.next())
        } else {
            (None, tokens.next())
        };
        let Some(path) = path else {
            break;
        };

        let kind = match status {
            'A' => ChangeKind::Added,
            'M' => ChangeKind::Modified,
            'R' => ChangeKind::Renamed,
            'C' => ChangeKind::Copied,
            'T' => ChangeKind::TypeChanged,
            _ => continue,
        };
        if new_mode == GITLINK_MODE {
            continue;
        }
        changes.push(FileChange {
            path: path.to_string(),
            previous_path,
            blob: new_blob.to_string(),
            kind,
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestGit;

    #[test]
    fn test_parse_log() {
        let output = "aaa\x1f\x1f2024-01-02T03:04:05+00:00\x1fAda\x1finitial\x1e\n\
                      bbb\x1faaa ccc\x1f2024-01-03T03:04:05+01:00\x1fBob\x1fmerge: things\x1e\n";
        let commits = parse_log(output).unwrap();
        assert_eq!(commits.len(), 2);
        assert!(commits[0].parents.is_empty());
        assert_eq!(commits[1].parents, vec!["aaa", "ccc"]);
        assert_eq!(commits[1].summary, "merge: things");
        assert_eq!(commits[1].author, "Bob");

        assert!(parse_log("garbage\x1e").is_err());
    }

    #[test]
    fn test_parse_raw_diff() {
        let output = ":000000 100644 0000000 1111111 A\0lib/new.py\0\
                      :100644 100644 2222222 3333333 M\0lib/changed.py\0\
                      :100644 000000 4444444 0000000 D\0lib/gone.py\0\
                      :100644 100644 5555555 5555555 R100\0lib/old name.py\0lib/new name.py\0\
                      :000000 160000 0000000 6666666 A\0vendor/sub\0";
        let changes = parse_raw_diff(output);
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["lib/new.py", "lib/changed.py", "lib/new name.py"]);
        assert_eq!(changes[2].kind, ChangeKind::Renamed);
        assert_eq!(changes[2].previous_path.as_deref(), Some("lib/old name.py"));
        assert_eq!(changes[2].blob, "5555555");
    }

    #[tokio::test]
    async fn test_repository_queries() {
        let dir = tempfile::tempdir().unwrap();
        let git = TestGit::new(dir.path());
        git.init().unwrap();
        git.config_user().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/util.py"), "X = 1\n").unwrap();
        git.add_all().unwrap();
        git.commit("first").unwrap();
        let first = git.rev_parse_head().unwrap();
        std::fs::write(dir.path().join("lib/util.py"), "X = 2\n").unwrap();
        std::fs::write(dir.path().join("other.py"), "Y = 1\n").unwrap();
        git.add_all().unwrap();
        git.commit("second").unwrap();
        let second = git.rev_parse_head().unwrap();

        let repo = GitRepo::discover(&dir.path().join("lib")).await.unwrap();
        assert_eq!(repo.root(), dir.path().canonicalize().unwrap());
        assert_eq!(repo.relative_path(&dir.path().join("lib/util.py")).as_deref(), Some("lib/util.py"));

        let commits = repo.commits(false).await.unwrap();
        let ids: Vec<&str> = commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);

        let root_changes = repo.changes(&commits[0]).await.unwrap();
        assert_eq!(root_changes.len(), 1);
        let changes = repo.changes(&commits[1]).await.unwrap();
        assert_eq!(changes.len(), 2);

        assert_eq!(repo.last_commit_for("other.py").await.unwrap(), Some(second.clone()));
        assert_eq!(repo.last_commit_for("missing.py").await.unwrap(), None);
        assert_eq!(repo.show_blob(&first, "lib/util.py").await.unwrap(), b"X = 1\n");
        assert_eq!(repo.resolve_commit("HEAD~1").await.unwrap(), Some(first));
        assert_eq!(repo.resolve_commit("no-such-ref").await.unwrap(), None);
        assert_eq!(commits[1].summary, "second");
    }

    #[tokio::test]
    async fn test_discover_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitRepo::discover(dir.path()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<WeaveError>(), Some(WeaveError::GitRepoInvalid { .. })));
    }
}
