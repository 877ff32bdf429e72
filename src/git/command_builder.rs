//! Type-safe Git command builder for consistent command execution
//!
//! Every git subprocess weave runs goes through [`GitCommand`], which handles working
//! directory selection, timeouts, logging under the `git` target, and mapping failures to
//! [`WeaveError`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::GIT_COMMAND_TIMEOUT;
use crate::core::WeaveError;
use crate::utils::platform::get_git_command;

/// Builder for one git invocation.
///
/// # Examples
///
/// ```rust,no_run
/// use weave_cli::git::command_builder::GitCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// let head = GitCommand::new()
///     .args(["rev-parse", "HEAD"])
///     .current_dir("/path/to/repo")
///     .execute_stdout()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// New commands time out after [`GIT_COMMAND_TIMEOUT`], capture output, and run in the
/// process working directory unless [`current_dir`](Self::current_dir) is set.
pub struct GitCommand {
    /// Command arguments to pass to Git
    args: Vec<String>,

    /// Working directory, passed to git as `-C <dir>`
    current_dir: Option<PathBuf>,

    /// Maximum duration to wait for command completion
    timeout_duration: Duration,

    /// Optional context string for log messages
    context: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            timeout_duration: GIT_COMMAND_TIMEOUT,
            context: None,
        }
    }
}

/// Captured output of a successful command.
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the command in `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Label included in log lines for this command.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Run to completion and return the raw output of a successful command.
    async fn run(&self) -> Result<Output> {
        let start = std::time::Instant::now();
        let git_command = get_git_command();
        let mut cmd = Command::new(git_command);

        let mut full_args = Vec::new();
        if let Some(ref dir) = self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        cmd.args(&full_args);

        if let Some(ref ctx) = self.context {
            tracing::debug!(target: "git", "({}) Executing command: {} {}", ctx, git_command, full_args.join(" "));
        } else {
            tracing::debug!(target: "git", "Executing command: {} {}", git_command, full_args.join(" "));
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let duration = self.timeout_duration;
        let output = match timeout(duration, cmd.output()).await {
            Ok(result) => result.map_err(|e| spawn_error(e, &full_args))?,
            Err(_) => {
                tracing::warn!(
                    target: "git",
                    "Command timed out after {} seconds: git {}",
                    duration.as_secs(),
                    full_args.join(" ")
                );
                return Err(WeaveError::GitCommandError {
                    operation: self.operation(),
                    stderr: format!(
                        "Git command timed out after {} seconds. Try running it manually: git {}",
                        duration.as_secs(),
                        full_args.join(" ")
                    ),
                }
                .into());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(
                target: "git",
                "Command failed with exit code: {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
            return Err(WeaveError::GitCommandError {
                operation: self.operation(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "git::perf", "Git {} took {:.2}s", self.operation(), elapsed.as_secs_f64());
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(target: "git::perf", "Git {} took {}ms", self.operation(), elapsed.as_millis());
        }

        Ok(output)
    }

    /// Execute and capture stdout and stderr as text.
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let output = self.run().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stderr.is_empty() {
            tracing::trace!(target: "git", "{}", stderr.trim());
        }
        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Execute and return trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute and return stdout untouched, for blob contents that may not be text.
    pub async fn execute_bytes(self) -> Result<Vec<u8>> {
        Ok(self.run().await?.stdout)
    }
}

fn spawn_error(error: std::io::Error, args: &[String]) -> anyhow::Error {
    if error.kind() == std::io::ErrorKind::NotFound {
        return WeaveError::GitNotFound.into();
    }
    anyhow::Error::new(error).context(format!("Failed to execute git {}", args.join(" ")))
}

// Convenience builders for the commands weave runs

impl GitCommand {
    pub fn show_toplevel() -> Self {
        Self::new().args(["rev-parse", "--show-toplevel"])
    }

    /// Resolve `reference` to a full commit id.
    pub fn verify_commit(reference: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", "--quiet", &format!("{reference}^{{commit}}")])
    }

    /// Commit log with one record per commit: id, parents, author date, author, subject.
    pub fn log_records(all_refs: bool) -> Self {
        let mut cmd = Self::new().args([
            "log",
            "--author-date-order",
            "--reverse",
            "--format=%H%x1f%P%x1f%aI%x1f%an%x1f%s%x1e",
        ]);
        if all_refs {
            cmd = cmd.arg("--all");
        }
        cmd
    }

    /// Last commit touching `path`.
    pub fn last_commit(path: &str) -> Self {
        Self::new().args(["log", "-1", "--format=%H", "--", path])
    }

    /// Raw, NUL-separated list of files changed by `commit` relative to `parent`, or
    /// relative to the empty tree for root commits.
    pub fn diff_tree(commit: &str, parent: Option<&str>) -> Self {
        let cmd = Self::new().args(["diff-tree", "-r", "-M", "-z", "--raw", "--no-commit-id"]);
        match parent {
            Some(parent) => cmd.args([parent, commit]),
            None => cmd.args(["--root", commit]),
        }
    }

    /// Contents of `path` as of `commit`.
    pub fn cat_blob(commit: &str, path: &str) -> Self {
        Self::new().args(["cat-file", "blob", &format!("{commit}:{path}")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        assert_eq!(GitCommand::cat_blob("abc", "lib/util.py").args, vec!["cat-file", "blob", "abc:lib/util.py"]);
        assert_eq!(
            GitCommand::diff_tree("abc", None).args,
            vec!["diff-tree", "-r", "-M", "-z", "--raw", "--no-commit-id", "--root", "abc"]
        );
        assert_eq!(GitCommand::diff_tree("abc", Some("def")).args[6..], ["def", "abc"]);
        assert!(GitCommand::log_records(true).args.contains(&"--all".to_string()));
        assert_eq!(GitCommand::verify_commit("HEAD~1").args[3], "HEAD~1^{commit}");
    }

    #[tokio::test]
    async fn test_failure_maps_to_git_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitCommand::show_toplevel().current_dir(dir.path()).execute_stdout().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WeaveError>(),
            Some(WeaveError::GitCommandError { operation, .. }) if operation == "rev-parse"
        ));
    }
}
