//! Shared plumbing for CLI commands.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::config::WeaveConfig;
use crate::core::WeaveError;
use crate::git::GitRepo;
use crate::history::{CacheIndex, CacheStore, GitBackend, Indexer};
use crate::lookup::{LookupEngine, LookupResult};
use crate::provenance::ChecksumAlgorithm;
use crate::utils::fs::atomic_write;

/// Common trait for CLI command execution
pub trait CommandExecutor: Sized {
    /// Run the command with the loaded configuration.
    fn execute_with_context(
        self,
        ctx: CommandContext,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: WeaveConfig,
    /// Directory the command was started in
    pub cwd: PathBuf,
    pub show_progress: bool,
}

impl CommandContext {
    /// Load configuration relative to the current directory.
    pub fn load(config_path: Option<&Path>, show_progress: bool) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let config = WeaveConfig::load_or_default(config_path, &cwd)?;
        Ok(Self {
            config,
            cwd,
            show_progress,
        })
    }

    /// `path` made absolute against the working directory.
    #[must_use]
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

/// History cache options shared by `locate`, `index` and `trace`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct HistoryArgs {
    /// Repository to search (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// History cache file (defaults to .weave-cache.json in the repository root)
    #[arg(long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Do not write the history cache back
    #[arg(long)]
    pub no_save_cache: bool,

    /// Index commits reachable from every ref instead of only HEAD
    #[arg(long)]
    pub all_refs: bool,

    /// Commits processed concurrently
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Checksum algorithm of the cache
    #[arg(long)]
    pub algorithm: Option<ChecksumAlgorithm>,
}

/// An opened repository together with its loaded history index.
pub struct HistorySession {
    pub repo: GitRepo,
    pub store: CacheStore,
    pub index: CacheIndex,
    pub engine: LookupEngine<GitBackend>,
}

impl HistoryArgs {
    #[must_use]
    pub fn algorithm(&self, ctx: &CommandContext) -> ChecksumAlgorithm {
        self.algorithm.unwrap_or(ctx.config.render.algorithm)
    }

    /// Discover the repository and load its history cache.
    pub async fn open(&self, ctx: &CommandContext, algorithm: ChecksumAlgorithm) -> Result<HistorySession> {
        let start = self.repo.as_deref().map_or_else(|| ctx.cwd.clone(), |p| ctx.absolute(p));
        let repo = GitRepo::discover(&start).await?;

        let cache_path = match &self.cache {
            Some(path) => ctx.absolute(path),
            None => ctx.config.cache_path(repo.root())?,
        };
        let persist = ctx.config.locate.save_cache && !self.no_save_cache;
        let store = CacheStore::new(cache_path, persist);
        let index = store.load(algorithm).await?;

        let mut options = ctx.config.indexer_options();
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(WeaveError::ConfigError {
                    message: "--workers must be at least 1".to_string(),
                }
                .into());
            }
            options.workers = workers;
        }
        options.handle_interrupts = true;
        options.show_progress = ctx.show_progress;

        let backend = GitBackend::new(repo.clone(), self.all_refs || ctx.config.locate.all_refs);
        let engine = LookupEngine::new(Indexer::new(backend, options), Some(store.clone()));
        Ok(HistorySession {
            repo,
            store,
            index,
            engine,
        })
    }
}

/// Print a found source the way `locate` and `trace` show it.
pub fn print_match(result: &LookupResult, indent: &str) {
    println!("{indent}{}  {}", "commit ".dimmed(), result.commit.yellow());
    println!("{indent}{}  {}", "path   ".dimmed(), result.path);
    println!("{indent}{}  {}", "date   ".dimmed(), result.date.to_rfc3339());
    if !result.author.is_empty() {
        println!("{indent}{}  {}", "author ".dimmed(), result.author);
    }
    if !result.summary.is_empty() {
        println!("{indent}{}  {}", "message".dimmed(), result.summary);
    }
}

/// Write `content` to `path` unless it exists and `force` is not set.
pub fn write_output(path: &Path, content: &[u8], force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(WeaveError::OutputExists {
            path: path.display().to_string(),
        }
        .into());
    }
    atomic_write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.py");
        write_output(&path, b"one\n", false).unwrap();

        let err = write_output(&path, b"two\n", false).unwrap_err();
        assert!(matches!(err.downcast_ref::<WeaveError>(), Some(WeaveError::OutputExists { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\n");

        write_output(&path, b"two\n", true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two\n");
    }

    #[test]
    fn test_absolute() {
        let ctx = CommandContext {
            config: WeaveConfig::default(),
            cwd: PathBuf::from("/work"),
            show_progress: false,
        };
        assert_eq!(ctx.absolute(Path::new("a.py")), PathBuf::from("/work/a.py"));
        assert_eq!(ctx.absolute(Path::new("/abs/a.py")), PathBuf::from("/abs/a.py"));
    }
}
