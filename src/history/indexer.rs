//! Incremental history walker.
//!
//! Commits not yet in the index are processed on a bounded pool: each worker lists a
//! commit's changes, reads every changed blob and checksums it on the blocking pool. The
//! coordinator consumes finished commits strictly in visit order and records each one,
//! blobs and "indexed" mark together, in a single synchronous step. Stopping early
//! (a match was found, Ctrl-C, an error) drops commits still in flight, so the index never
//! holds a partially indexed commit.

use anyhow::{Context, Result};
use futures::StreamExt;

use crate::constants::{DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_INDEX_WORKERS};
use crate::git::CommitInfo;
use crate::history::{BlobRecord, CacheIndex, CacheStore, HistoryBackend};
use crate::provenance::ChecksumAlgorithm;
use crate::utils::progress::ProgressBar;

/// Tuning for one indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerOptions {
    /// Commits processed concurrently
    pub workers: usize,
    /// Save the index after this many newly indexed commits; 0 disables checkpoints
    pub checkpoint_interval: usize,
    /// Stop cleanly on Ctrl-C
    pub handle_interrupts: bool,
    pub show_progress: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_INDEX_WORKERS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            handle_interrupts: false,
            show_progress: false,
        }
    }
}

/// What an indexing run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    /// Commits newly recorded
    pub indexed: usize,
    /// Commits that were not yet indexed when the run started
    pub pending: usize,
    /// The stop condition ended the run
    pub stopped: bool,
    /// Ctrl-C ended the run
    pub interrupted: bool,
}

impl IndexOutcome {
    /// Whether every known commit is now indexed.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.indexed == self.pending
    }
}

/// Walks history and feeds a [`CacheIndex`].
pub struct Indexer<B: HistoryBackend> {
    backend: B,
    options: IndexerOptions,
}

impl<B: HistoryBackend> Indexer<B> {
    pub fn new(backend: B, options: IndexerOptions) -> Self {
        Self {
            backend,
            options,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Index every commit not yet in `index`, visiting `hint` first when given.
    pub async fn index_new_commits(
        &self,
        index: &mut CacheIndex,
        hint: Option<&str>,
        store: Option<&CacheStore>,
    ) -> Result<IndexOutcome> {
        self.index_until(index, hint, store, |_, _| false).await
    }

    /// Index commits not yet in `index` until `stop` returns true for a recorded commit.
    ///
    /// `stop` sees each commit right after it was recorded, together with its blobs.
    /// Checkpoints are written to `store` every `checkpoint_interval` commits; if a commit
    /// fails, the progress made so far is saved before the error is returned.
    pub async fn index_until<P>(
        &self,
        index: &mut CacheIndex,
        hint: Option<&str>,
        store: Option<&CacheStore>,
        mut stop: P,
    ) -> Result<IndexOutcome>
    where
        P: FnMut(&CommitInfo, &[BlobRecord]) -> bool,
    {
        let pending = self.pending_commits(index, hint).await?;
        let mut outcome = IndexOutcome {
            pending: pending.len(),
            ..IndexOutcome::default()
        };
        if pending.is_empty() {
            tracing::debug!(target: "index", "All {} commits already indexed", index.commit_count());
            return Ok(outcome);
        }
        tracing::info!(target: "index", "Indexing {} new commit(s)", pending.len());

        let progress = if self.options.show_progress {
            ProgressBar::new(pending.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_prefix("Indexing");

        let algorithm = index.algorithm;
        let backend = &self.backend;
        let mut results = futures::stream::iter(pending.into_iter().map(|commit| async move {
            let blobs = index_commit(backend, &commit, algorithm).await;
            (commit, blobs)
        }))
        .buffered(self.options.workers.max(1));

        let interrupt = interrupt_signal(self.options.handle_interrupts);
        tokio::pin!(interrupt);

        loop {
            let next = tokio::select! {
                biased;
                () = &mut interrupt => {
                    tracing::warn!(target: "index", "Interrupted; discarding commits in progress");
                    outcome.interrupted = true;
                    break;
                }
                next = results.next() => next,
            };
            let Some((commit, blobs)) = next else {
                break;
            };

            let blobs = match blobs {
                Ok(blobs) => blobs,
                Err(e) => {
                    progress.finish_and_clear();
                    if let Some(store) = store {
                        store.save(index).await?;
                    }
                    return Err(e.context(format!("Failed to index commit {}", commit.short_id())));
                }
            };

            index.record_commit(&commit, &blobs);
            outcome.indexed += 1;
            progress.inc(1);
            progress.set_message(commit.short_id().to_string());
            tracing::trace!(target: "index", "Indexed {} ({} blobs)", commit.short_id(), blobs.len());

            if stop(&commit, &blobs) {
                outcome.stopped = true;
                break;
            }
            let interval = self.options.checkpoint_interval;
            if let Some(store) = store
                && interval > 0
                && outcome.indexed % interval == 0
            {
                tracing::debug!(target: "index", "Checkpoint after {} commits", outcome.indexed);
                store.save(index).await?;
            }
        }
        progress.finish_and_clear();

        tracing::info!(
            target: "index",
            "Indexed {} of {} new commit(s); {} commits in cache",
            outcome.indexed,
            outcome.pending,
            index.commit_count()
        );
        Ok(outcome)
    }

    /// Commits to visit, hint first, then oldest first.
    async fn pending_commits(&self, index: &CacheIndex, hint: Option<&str>) -> Result<Vec<CommitInfo>> {
        let mut pending: Vec<CommitInfo> = self
            .backend
            .list_commits()
            .await?
            .into_iter()
            .filter(|c| !index.is_indexed(&c.id))
            .collect();

        let Some(hint) = hint else {
            return Ok(pending);
        };
        match self.backend.resolve_commit(hint).await? {
            Some(id) => {
                if let Some(position) = pending.iter().position(|c| c.id == id) {
                    let commit = pending.remove(position);
                    pending.insert(0, commit);
                } else if !index.is_indexed(&id) {
                    tracing::warn!(target: "index", "Commit {} is not part of the scanned history", hint);
                }
            }
            None => {
                tracing::warn!(target: "index", "'{}' does not name a commit; scanning full history", hint);
            }
        }
        Ok(pending)
    }
}

/// Checksum every blob `commit` introduced.
async fn index_commit<B: HistoryBackend>(
    backend: &B,
    commit: &CommitInfo,
    algorithm: ChecksumAlgorithm,
) -> Result<Vec<BlobRecord>> {
    let changes = backend.list_changes(commit).await?;
    let mut blobs = Vec::with_capacity(changes.len());
    for change in changes {
        let content = backend.read_blob(&commit.id, &change.path).await?;
        let checksum = tokio::task::spawn_blocking(move || algorithm.digest(&content))
            .await
            .context("Checksum task failed")?;
        blobs.push(BlobRecord {
            path: change.path,
            checksum,
        });
    }
    Ok(blobs)
}

async fn interrupt_signal(enabled: bool) {
    if enabled && tokio::signal::ctrl_c().await.is_ok() {
        return;
    }
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::memory::MemoryBackend;

    fn three_commits() -> (MemoryBackend, Vec<String>) {
        let backend = MemoryBackend::new();
        let ids = vec![
            backend.commit(&[("a.py", "A = 1\n")]),
            backend.commit(&[("b.py", "B = 1\n"), ("a.py", "A = 2\n")]),
            backend.commit(&[("c.py", "C = 1\n")]),
        ];
        (backend, ids)
    }

    #[tokio::test]
    async fn test_indexes_everything_once() {
        let (backend, ids) = three_commits();
        let indexer = Indexer::new(backend.clone(), IndexerOptions::default());
        let mut index = CacheIndex::new(ChecksumAlgorithm::Sha256);

        let outcome = indexer.index_new_commits(&mut index, None, None).await.unwrap();
        assert_eq!(outcome.indexed, 3);
        assert!(outcome.exhausted());
        assert!(ids.iter().all(|id| index.is_indexed(id)));
        let matches = index.matches(&ChecksumAlgorithm::Sha256.digest(b"A = 2\n"));
        assert_eq!(matches[0].commit, ids[1]);

        let before = backend.scanned();
        let outcome = indexer.index_new_commits(&mut index, None, None).await.unwrap();
        assert_eq!(outcome.indexed, 0);
        assert_eq!(backend.scanned(), before);
    }

    #[tokio::test]
    async fn test_hint_is_visited_first_and_stop_discards_the_rest() {
        let (backend, ids) = three_commits();
        let indexer = Indexer::new(
            backend,
            IndexerOptions {
                workers: 1,
                ..IndexerOptions::default()
            },
        );
        let mut index = CacheIndex::new(ChecksumAlgorithm::Sha256);

        let mut visited = Vec::new();
        let outcome = indexer
            .index_until(&mut index, Some(&ids[2]), None, |commit, _| {
                visited.push(commit.id.clone());
                visited.len() == 2
            })
            .await
            .unwrap();
        assert!(outcome.stopped);
        assert_eq!(visited, vec![ids[2].clone(), ids[0].clone()]);
        assert!(!index.is_indexed(&ids[1]));
        assert_eq!(index.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_checkpoints_are_saved() {
        let (backend, _) = three_commits();
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"), true);
        let indexer = Indexer::new(
            backend,
            IndexerOptions {
                checkpoint_interval: 2,
                ..IndexerOptions::default()
            },
        );
        let mut index = CacheIndex::new(ChecksumAlgorithm::Sha256);
        indexer.index_new_commits(&mut index, None, Some(&store)).await.unwrap();

        let saved = store.load(ChecksumAlgorithm::Sha256).await.unwrap();
        assert_eq!(saved.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_earlier_progress_only() {
        let backend = MemoryBackend::new();
        let ids: Vec<String> = (1..=5).map(|n| backend.commit(&[("f.py", format!("F = {n}\n").as_str())])).collect();
        backend.fail_reads_at(&ids[2]);

        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"), true);
        let indexer = Indexer::new(
            backend,
            IndexerOptions {
                workers: 4,
                checkpoint_interval: 0,
                ..IndexerOptions::default()
            },
        );
        let mut index = CacheIndex::new(ChecksumAlgorithm::Sha256);

        let err = indexer.index_new_commits(&mut index, None, Some(&store)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to index commit"));

        let mut indexed: Vec<&str> = index.commit_ids().collect();
        indexed.sort_unstable();
        assert_eq!(indexed, vec![ids[0].as_str(), ids[1].as_str()]);
        assert!(index.matches(&ChecksumAlgorithm::Sha256.digest(b"F = 4\n")).is_empty());

        let saved = store.load(ChecksumAlgorithm::Sha256).await.unwrap();
        let mut saved_ids: Vec<&str> = saved.commit_ids().collect();
        saved_ids.sort_unstable();
        assert_eq!(saved_ids, indexed);
    }

    #[tokio::test]
    async fn test_unknown_hint_falls_back_to_full_scan() {
        let (backend, _) = three_commits();
        let indexer = Indexer::new(backend, IndexerOptions::default());
        let mut index = CacheIndex::new(ChecksumAlgorithm::Sha256);
        let outcome = indexer.index_new_commits(&mut index, Some("zzz"), None).await.unwrap();
        assert_eq!(outcome.indexed, 3);
    }
}
