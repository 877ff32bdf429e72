//! In-memory history for tests.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, FixedOffset};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::git::{ChangeKind, CommitInfo, FileChange};
use crate::history::HistoryBackend;

#[derive(Debug, Default)]
struct State {
    commits: Vec<CommitInfo>,
    changes: HashMap<String, Vec<(String, Vec<u8>)>>,
    unreadable: HashSet<String>,
}

/// A linear history built in code; counts how many commits had their changes listed.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    listed: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a commit one day after the previous one and return its id.
    pub fn commit(&self, files: &[(&str, &str)]) -> String {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let n = state.commits.len();
        let id = format!("{:040x}", n + 1);
        let base: DateTime<FixedOffset> =
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap_or_default();
        let parents = state.commits.last().map(|c| vec![c.id.clone()]).unwrap_or_default();
        state.commits.push(CommitInfo {
            id: id.clone(),
            parents,
            date: base + Duration::days(n as i64),
            author: "Test User".to_string(),
            summary: format!("commit {}", n + 1),
        });
        state.changes.insert(
            id.clone(),
            files.iter().map(|(p, c)| ((*p).to_string(), c.as_bytes().to_vec())).collect(),
        );
        id
    }

    /// Make every blob read at `commit` fail.
    pub fn fail_reads_at(&self, commit: &str) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.unreadable.insert(commit.to_string());
    }

    /// Number of commits whose changes were listed so far.
    pub fn scanned(&self) -> usize {
        self.listed.load(Ordering::SeqCst)
    }
}

impl HistoryBackend for MemoryBackend {
    async fn list_commits(&self) -> Result<Vec<CommitInfo>> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.commits.clone())
    }

    async fn list_changes(&self, commit: &CommitInfo) -> Result<Vec<FileChange>> {
        self.listed.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let files = state.changes.get(&commit.id).ok_or_else(|| anyhow!("unknown commit {}", commit.id))?;
        Ok(files
            .iter()
            .map(|(path, _)| FileChange {
                path: path.clone(),
                previous_path: None,
                blob: String::new(),
                kind: ChangeKind::Modified,
            })
            .collect())
    }

    async fn read_blob(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.unreadable.contains(commit) {
            return Err(anyhow!("cannot read {path} at {commit}"));
        }
        let index = state
            .commits
            .iter()
            .position(|c| c.id == commit)
            .ok_or_else(|| anyhow!("unknown commit {commit}"))?;
        state.commits[..=index]
            .iter()
            .rev()
            .find_map(|c| state.changes.get(&c.id)?.iter().find(|(p, _)| p == path))
            .map(|(_, content)| content.clone())
            .ok_or_else(|| anyhow!("{path} does not exist at {commit}"))
    }

    async fn resolve_commit(&self, reference: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.commits.iter().find(|c| c.id.starts_with(reference)).map(|c| c.id.clone()))
    }
}
