//! Git test helper utilities
//!
//! Builds throwaway repositories for tests through the git CLI.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git command wrapper for tests
///
/// Use this instead of raw `std::process::Command` for git operations in tests. Every
/// commit made through it has a fixed, increasing author date so history order does not
/// depend on how fast the test runs.
pub struct TestGit {
    repo_path: PathBuf,
    commits: std::cell::Cell<u32>,
}

impl TestGit {
    fn run_git_command(
        &self,
        args: &[&str],
        env: &[(&str, String)],
        action: &str,
    ) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }

        Ok(output)
    }

    /// Create a new TestGit instance for the given repository path
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            commits: std::cell::Cell::new(0),
        }
    }

    /// Initialize a new git repository
    pub fn init(&self) -> Result<()> {
        self.run_git_command(&["init", "--quiet"], &[], "Failed to initialize git repository")?;
        Ok(())
    }

    /// Configure git user for tests
    pub fn config_user(&self) -> Result<()> {
        self.run_git_command(
            &["config", "user.email", "test@weave.example"],
            &[],
            "Failed to configure git user email",
        )?;
        self.run_git_command(
            &["config", "user.name", "Test User"],
            &[],
            "Failed to configure git user name",
        )?;
        self.run_git_command(
            &["config", "commit.gpgsign", "false"],
            &[],
            "Failed to disable commit signing",
        )?;
        Ok(())
    }

    /// Initialize a repository with a configured user
    pub fn init_with_user(&self) -> Result<()> {
        self.init()?;
        self.config_user()
    }

    /// Return the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Write `content` to `relative` inside the repository, creating directories
    pub fn write_file(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.repo_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Add all files to staging
    pub fn add_all(&self) -> Result<()> {
        self.run_git_command(&["add", "-A"], &[], "Failed to add files to git")?;
        Ok(())
    }

    /// Create a commit with the given message
    ///
    /// The n-th commit is dated n days after 2024-01-01.
    pub fn commit(&self, message: &str) -> Result<()> {
        let n = self.commits.get();
        self.commits.set(n + 1);
        let Some(date) = chrono::DateTime::from_timestamp(1_704_067_200 + i64::from(n) * 86_400, 0)
        else {
            bail!("Commit date out of range for commit {n}");
        };
        let date = date.to_rfc3339();
        self.run_git_command(
            &["commit", "--quiet", "--allow-empty", "-m", message],
            &[("GIT_AUTHOR_DATE", date.clone()), ("GIT_COMMITTER_DATE", date)],
            "Failed to create git commit",
        )?;
        Ok(())
    }

    /// Stage everything and commit, returning the new commit id
    pub fn commit_all(&self, message: &str) -> Result<String> {
        self.add_all()?;
        self.commit(message)?;
        self.rev_parse_head()
    }

    /// Get current commit SHA
    pub fn rev_parse_head(&self) -> Result<String> {
        let output =
            self.run_git_command(&["rev-parse", "HEAD"], &[], "Failed to get current commit SHA")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create and checkout a branch
    pub fn create_branch(&self, branch_name: &str) -> Result<()> {
        self.run_git_command(
            &["checkout", "--quiet", "-b", branch_name],
            &[],
            &format!("Failed to create branch: {branch_name}"),
        )?;
        Ok(())
    }

    /// Checkout a branch or commit
    pub fn checkout(&self, ref_name: &str) -> Result<()> {
        self.run_git_command(
            &["checkout", "--quiet", ref_name],
            &[],
            &format!("Failed to checkout: {ref_name}"),
        )?;
        Ok(())
    }
}
