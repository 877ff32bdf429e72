//! Persistence of the history index.
//!
//! Loads tolerate a missing or empty file and reject anything else that does not decode.
//! Saves write the whole index atomically while holding an exclusive advisory lock on a
//! `<cache>.lock` sidecar, so concurrent weave processes never interleave writes.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::constants::CACHE_FORMAT_VERSION;
use crate::core::WeaveError;
use crate::history::CacheIndex;
use crate::provenance::ChecksumAlgorithm;
use crate::utils::fs::atomic_write;

/// Where the index lives and whether it may be written.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    persist: bool,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>, persist: bool) -> Self {
        Self {
            path: path.into(),
            persist,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn persists(&self) -> bool {
        self.persist
    }

    /// Load the index, or an empty one if the file does not exist or is empty.
    pub async fn load(&self, algorithm: ChecksumAlgorithm) -> Result<CacheIndex> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(target: "index", "No cache at {}; starting empty", self.path.display());
                return Ok(CacheIndex::new(algorithm));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read cache {}", self.path.display()));
            }
        };
        let index = decode(&self.path, &bytes, algorithm)?;
        tracing::debug!(
            target: "index",
            "Loaded cache {} ({} commits, {} checksums)",
            self.path.display(),
            index.commit_count(),
            index.checksum_count()
        );
        Ok(index)
    }

    /// Write `index` if persistence is enabled.
    pub async fn save(&self, index: &CacheIndex) -> Result<()> {
        if !self.persist {
            tracing::debug!(target: "index", "Cache persistence disabled; not saving");
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(index).context("Failed to serialize history cache")?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let lock = lock_file(&path)?;
            lock.lock_exclusive()
                .with_context(|| format!("Failed to lock cache {}", path.display()))?;
            let written = atomic_write(&path, &json);
            if let Err(e) = FileExt::unlock(&lock) {
                tracing::warn!(target: "index", "Failed to unlock cache {}: {}", path.display(), e);
            }
            written
        })
        .await
        .context("Failed to spawn blocking task for cache save")??;

        tracing::debug!(
            target: "index",
            "Saved cache {} ({} commits)",
            self.path.display(),
            index.commit_count()
        );
        Ok(())
    }
}

fn lock_file(path: &Path) -> Result<File> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    let lock_path = path.with_file_name(name);
    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::utils::fs::ensure_dir(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))
}

fn decode(path: &Path, bytes: &[u8], algorithm: ChecksumAlgorithm) -> Result<CacheIndex> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(CacheIndex::new(algorithm));
    }
    let display = path.display().to_string();

    let index: CacheIndex = serde_json::from_slice(bytes).map_err(|e| WeaveError::CacheCorrupt {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    if index.version > CACHE_FORMAT_VERSION {
        return Err(WeaveError::CacheCorrupt {
            path: display,
            reason: format!(
                "format version {} is newer than the supported version {CACHE_FORMAT_VERSION}",
                index.version
            ),
        }
        .into());
    }
    if index.algorithm != algorithm {
        return Err(WeaveError::CacheAlgorithmMismatch {
            path: display,
            expected: algorithm.to_string(),
            found: index.algorithm.to_string(),
        }
        .into());
    }
    Ok(index)
}
