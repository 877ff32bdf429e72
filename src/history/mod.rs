//! Commit history indexing.
//!
//! The index maps blob checksums to the commits and paths that introduced them. It grows
//! incrementally: each run only visits commits not yet recorded, and a commit is recorded
//! together with all of its blobs or not at all.
//!
//! - [`CacheIndex`] - the index itself and its JSON form
//! - [`CacheStore`] - loading and atomic, locked saving
//! - [`Indexer`] - walks history through a [`HistoryBackend`], checksumming blobs on a
//!   bounded worker pool
//!
//! The only backend shipped is [`GitBackend`], which drives the git CLI.

pub mod index;
pub mod indexer;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod store;

pub use index::{BlobRecord, CacheIndex, IndexedCommit, SourceMatch};
pub use indexer::{IndexOutcome, Indexer, IndexerOptions};
pub use store::CacheStore;

use anyhow::Result;
use std::future::Future;

use crate::git::{CommitInfo, FileChange, GitRepo};

/// The version control operations indexing needs.
pub trait HistoryBackend: Clone + Send + Sync + 'static {
    /// Every commit to consider, oldest author date first.
    fn list_commits(&self) -> impl Future<Output = Result<Vec<CommitInfo>>> + Send;

    /// Files with new content in `commit`.
    fn list_changes(&self, commit: &CommitInfo) -> impl Future<Output = Result<Vec<FileChange>>> + Send;

    /// Raw contents of `path` at `commit`.
    fn read_blob(&self, commit: &str, path: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Full id of `reference`, or `None` if it names no commit.
    fn resolve_commit(&self, reference: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// History of a git repository.
#[derive(Debug, Clone)]
pub struct GitBackend {
    repo: GitRepo,
    all_refs: bool,
}

impl GitBackend {
    /// Index commits reachable from `HEAD`, or from every ref when `all_refs` is set.
    pub fn new(repo: GitRepo, all_refs: bool) -> Self {
        Self {
            repo,
            all_refs,
        }
    }

    #[must_use]
    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }
}

impl HistoryBackend for GitBackend {
    async fn list_commits(&self) -> Result<Vec<CommitInfo>> {
        self.repo.commits(self.all_refs).await
    }

    async fn list_changes(&self, commit: &CommitInfo) -> Result<Vec<FileChange>> {
        self.repo.changes(commit).await
    }

    async fn read_blob(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        self.repo.show_blob(commit, path).await
    }

    async fn resolve_commit(&self, reference: &str) -> Result<Option<String>> {
        self.repo.resolve_commit(reference).await
    }
}
