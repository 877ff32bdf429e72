//! In-memory history index and its on-disk JSON form.
//!
//! ```json
//! {
//!   "version": 1,
//!   "algorithm": "sha256",
//!   "commits": { "<id>": { "date": "...", "author": "...", "summary": "..." } },
//!   "entries": { "<digest>": [ { "commit": "<id>", "path": "lib/util.py", "date": "..." } ] }
//! }
//! ```
//!
//! A commit appears in `commits` only once every blob it introduced is in `entries`;
//! [`CacheIndex::record_commit`] does both in one step.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::CACHE_FORMAT_VERSION;
use crate::git::CommitInfo;
use crate::provenance::{Checksum, ChecksumAlgorithm};

/// Metadata kept for every indexed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedCommit {
    pub date: DateTime<FixedOffset>,
    pub author: String,
    pub summary: String,
}

/// One place a checksum was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMatch {
    pub commit: String,
    pub path: String,
    pub date: DateTime<FixedOffset>,
}

/// A blob checksummed while indexing a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub path: String,
    pub checksum: Checksum,
}

/// Checksum → occurrences, plus the set of commits already indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub version: u32,
    pub algorithm: ChecksumAlgorithm,
    #[serde(default)]
    commits: BTreeMap<String, IndexedCommit>,
    #[serde(default)]
    entries: BTreeMap<String, Vec<SourceMatch>>,
}

impl CacheIndex {
    /// An empty index for `algorithm`.
    #[must_use]
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            algorithm,
            commits: BTreeMap::new(),
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_indexed(&self, commit: &str) -> bool {
        self.commits.contains_key(commit)
    }

    /// Number of indexed commits.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Number of distinct checksums.
    #[must_use]
    pub fn checksum_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn commit(&self, id: &str) -> Option<&IndexedCommit> {
        self.commits.get(id)
    }

    /// Ids of every indexed commit.
    pub fn commit_ids(&self) -> impl Iterator<Item = &str> {
        self.commits.keys().map(String::as_str)
    }

    /// Every recorded occurrence of `checksum`, in the order they were indexed.
    #[must_use]
    pub fn matches(&self, checksum: &Checksum) -> &[SourceMatch] {
        if checksum.algorithm() != self.algorithm {
            return &[];
        }
        self.entries.get(checksum.digest()).map_or(&[], Vec::as_slice)
    }

    /// Record every blob of `commit` and mark it indexed.
    ///
    /// Recording an already indexed commit changes nothing.
    pub fn record_commit(&mut self, commit: &CommitInfo, blobs: &[BlobRecord]) {
        if self.is_indexed(&commit.id) {
            return;
        }
        for blob in blobs.iter().filter(|b| b.checksum.algorithm() == self.algorithm) {
            let entry = self.entries.entry(blob.checksum.digest().to_string()).or_default();
            if !entry.iter().any(|m| m.commit == commit.id && m.path == blob.path) {
                entry.push(SourceMatch {
                    commit: commit.id.clone(),
                    path: blob.path.clone(),
                    date: commit.date,
                });
            }
        }
        self.commits.insert(
            commit.id.clone(),
            IndexedCommit {
                date: commit.date,
                author: commit.author.clone(),
                summary: commit.summary.clone(),
            },
        );
    }
}
