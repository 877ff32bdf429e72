//! Checksum → source lookup.
//!
//! A query moves through these states:
//!
//! ```text
//! Start → CacheCheck ─────────────────────────────→ Found
//!              └→ CacheMiss → ScanHistory ─┬──────→ Found
//!                                          └──────→ Exhausted
//! ```
//!
//! The cache answers a query when it already knows the checksum and either no hint was
//! given or the hinted commit is among the known matches. Otherwise the engine indexes
//! commits it has not seen, visiting the hint first, and stops as soon as a newly indexed
//! commit contains the checksum. A hint that does not contain the checksum never produces
//! a match; the scan simply continues through the rest of history.
//!
//! When several commits contain the checksum, the hinted commit wins if it is one of
//! them, otherwise the commit with the earliest author date.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use std::path::{Component, Path, PathBuf};

use crate::core::WeaveError;
use crate::history::{CacheIndex, CacheStore, HistoryBackend, Indexer, SourceMatch};
use crate::provenance::{Checksum, ProvenanceHeader, decode};
use crate::utils::fs::atomic_write;

/// States a lookup passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Start,
    CacheCheck,
    CacheMiss,
    ScanHistory,
    Found,
    Exhausted,
}

/// One lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub checksum: Checksum,
    /// Commit expected to contain the checksum
    pub commit_hint: Option<String>,
    /// Only count matches at this repository path
    pub path: Option<String>,
}

impl LookupQuery {
    pub fn new(checksum: Checksum) -> Self {
        Self {
            checksum,
            commit_hint: None,
            path: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.commit_hint = hint;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: Option<String>) -> Self {
        self.path = path;
        self
    }

    fn accepts(&self, candidate: &SourceMatch) -> bool {
        self.path.as_deref().is_none_or(|p| p == candidate.path)
    }
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub checksum: Checksum,
    pub commit: String,
    pub path: String,
    pub date: DateTime<FixedOffset>,
    pub author: String,
    pub summary: String,
    /// Commits indexed to answer this query
    pub scanned: usize,
    /// Every state visited, `Start` first
    pub states: Vec<LookupState>,
}

impl LookupResult {
    /// Whether the cache answered without scanning.
    #[must_use]
    pub fn from_cache(&self) -> bool {
        !self.states.contains(&LookupState::ScanHistory)
    }
}

/// The result of looking up one header of an artifact.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub header: ProvenanceHeader,
    /// `None` when no commit in history contains the checksum
    pub found: Option<LookupResult>,
}

/// Answers lookups against a history index.
pub struct LookupEngine<B: HistoryBackend> {
    indexer: Indexer<B>,
    store: Option<CacheStore>,
}

impl<B: HistoryBackend> LookupEngine<B> {
    /// `store` receives checkpoints during scans and the index after every scan.
    pub fn new(indexer: Indexer<B>, store: Option<CacheStore>) -> Self {
        Self {
            indexer,
            store,
        }
    }

    #[must_use]
    pub fn indexer(&self) -> &Indexer<B> {
        &self.indexer
    }

    /// Find the commit and path that produced `query.checksum`.
    ///
    /// Fails with [`WeaveError::NoMatchingSource`] once the whole history is indexed
    /// without a match.
    pub async fn lookup(&self, index: &mut CacheIndex, query: &LookupQuery) -> Result<LookupResult> {
        let mut states = vec![LookupState::Start, LookupState::CacheCheck];
        let hint = match &query.commit_hint {
            Some(reference) => {
                let resolved = self.indexer.backend().resolve_commit(reference).await?;
                if resolved.is_none() {
                    tracing::warn!(target: "lookup", "Commit hint '{}' does not name a commit; ignoring it", reference);
                }
                resolved
            }
            None => None,
        };

        let cached = best_match(index, query, hint.as_deref());
        let has_cached = cached.is_some();
        let hint_satisfied = hint.as_ref().is_none_or(|h| cached.as_ref().is_some_and(|m| &m.commit == h));
        if let Some(found) = cached.filter(|_| hint_satisfied) {
            tracing::debug!(target: "lookup", "Cache hit for {}", query.checksum);
            states.push(LookupState::Found);
            return Ok(self.result(index, query, found, 0, states));
        }
        if hint.as_ref().is_some_and(|h| index.is_indexed(h))
            && let Some(found) = best_match(index, query, None)
        {
            tracing::warn!(target: "lookup", "Hinted commit does not contain {}; using earliest match", query.checksum);
            states.push(LookupState::Found);
            return Ok(self.result(index, query, found, 0, states));
        }

        states.push(LookupState::CacheMiss);
        states.push(LookupState::ScanHistory);
        tracing::info!(target: "lookup", "{} not in cache; scanning history", query.checksum);

        let target = query.checksum.clone();
        let scan = self
            .indexer
            .index_until(index, hint.as_deref(), self.store.as_ref(), |commit, blobs| {
                let matched = blobs.iter().any(|b| {
                    b.checksum == target && query.path.as_deref().is_none_or(|p| p == b.path)
                });
                // A hint without the content falls back to what the cache already holds
                matched || (has_cached && hint.as_deref() == Some(commit.id.as_str()))
            })
            .await;
        if let Some(store) = &self.store {
            store.save(index).await?;
        }
        let outcome = scan?;

        if outcome.interrupted {
            return Err(WeaveError::Other {
                message: "History scan interrupted".to_string(),
            }
            .into());
        }

        match best_match(index, query, hint.as_deref()) {
            Some(found) => {
                states.push(LookupState::Found);
                Ok(self.result(index, query, found, outcome.indexed, states))
            }
            None => {
                tracing::debug!(target: "lookup", "History exhausted after {} commits", outcome.indexed);
                Err(WeaveError::NoMatchingSource {
                    checksum: query.checksum.to_string(),
                }
                .into())
            }
        }
    }

    fn result(
        &self,
        index: &CacheIndex,
        query: &LookupQuery,
        found: SourceMatch,
        scanned: usize,
        states: Vec<LookupState>,
    ) -> LookupResult {
        let meta = index.commit(&found.commit);
        LookupResult {
            checksum: query.checksum.clone(),
            commit: found.commit,
            path: found.path,
            date: found.date,
            author: meta.map(|m| m.author.clone()).unwrap_or_default(),
            summary: meta.map(|m| m.summary.clone()).unwrap_or_default(),
            scanned,
            states,
        }
    }

    /// Read the matched file back from history and confirm its checksum.
    pub async fn recover_source(&self, result: &LookupResult) -> Result<Vec<u8>> {
        let content = self.indexer.backend().read_blob(&result.commit, &result.path).await?;
        if !result.checksum.matches(&content) {
            let actual = result.checksum.algorithm().digest(&content);
            return Err(WeaveError::ChecksumMismatch {
                name: result.path.clone(),
                expected: result.checksum.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }
        Ok(content)
    }

    /// Look up every provenance header of `artifact`, using each header's commit as hint.
    pub async fn trace(&self, index: &mut CacheIndex, artifact: &str) -> Result<Vec<TraceEntry>> {
        let headers = decode(artifact)?;
        let mut entries = Vec::with_capacity(headers.len());

        for header in headers {
            let query = LookupQuery::new(header.checksum.clone()).with_hint(header.commit.clone());
            let found = match self.lookup(index, &query).await {
                Ok(result) => Some(result),
                Err(e) if matches!(e.downcast_ref::<WeaveError>(), Some(WeaveError::NoMatchingSource { .. })) => {
                    tracing::warn!(target: "lookup", "No source found for {}", header.path);
                    None
                }
                Err(e) => return Err(e),
            };
            entries.push(TraceEntry {
                header,
                found,
            });
        }
        Ok(entries)
    }

    /// Write every recovered fragment of `entries` under `dir` at its header path.
    ///
    /// Returns the files written.
    pub async fn restore(&self, entries: &[TraceEntry], dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for entry in entries {
            let Some(found) = &entry.found else {
                continue;
            };
            let target = dir.join(safe_relative(&entry.header.path)?);
            let content = self.recover_source(found).await?;
            atomic_write(&target, &content)
                .with_context(|| format!("Failed to restore {}", entry.header.path))?;
            written.push(target);
        }
        Ok(written)
    }
}

/// Best match for `query` among what `index` already knows.
fn best_match(index: &CacheIndex, query: &LookupQuery, hint: Option<&str>) -> Option<SourceMatch> {
    let candidates: Vec<&SourceMatch> =
        index.matches(&query.checksum).iter().filter(|m| query.accepts(m)).collect();
    if let Some(hint) = hint
        && let Some(hinted) = candidates.iter().find(|m| m.commit == hint)
    {
        return Some((*hinted).clone());
    }
    candidates.into_iter().min_by_key(|m| m.date).cloned()
}

/// A header path as a relative path that stays inside the restore directory.
fn safe_relative(path: &str) -> Result<PathBuf> {
    let relative = PathBuf::from(path);
    let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.is_empty() {
        return Err(WeaveError::InvalidHeader {
            reason: format!("cannot restore '{path}': path must be relative and stay inside the output directory"),
        }
        .into());
    }
    Ok(relative)
}
