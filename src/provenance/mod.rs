//! Provenance header codec
//!
//! Every fragment inlined into a rendered artifact is preceded by a two-line comment
//! that records where the code came from:
//!
//! ```text
//! # Objects below have been imported from: features/common/utils.py
//! # sha256:6f1e…c2 git:8d3a52f0c0d1d6b7d0f6e1b7c1b0f8a7d2e9c4a1
//! ```
//!
//! The first line names the fragment's repository path. The second carries the checksum
//! of the fragment's original bytes and, when known, the last commit that touched it. The
//! `git:` token is left out entirely when no commit is known.
//!
//! [`decode`] is the only thing the lookup side needs from a deployed artifact. It also
//! understands the older three-line layout in which the path sits on its own indented
//! comment line below the attribution.
//!
//! The codec satisfies `decode(encode(h)) == [h]` for every header accepted by
//! [`ProvenanceHeader::encode`].

pub mod checksum;

pub use checksum::{Checksum, ChecksumAlgorithm};

use anyhow::{Context, Result};
use regex::Regex;

use crate::constants::{COMMIT_LABEL, HEADER_ATTRIBUTION};
use crate::core::WeaveError;

/// The provenance marker for one inlined fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceHeader {
    /// Repository-relative path of the fragment, `/`-separated
    pub path: String,
    /// Checksum of the fragment's original, pre-rewrite bytes
    pub checksum: Checksum,
    /// Last commit that touched the fragment, if known
    pub commit: Option<String>,
}

impl ProvenanceHeader {
    /// Create a header.
    pub fn new(path: impl Into<String>, checksum: Checksum, commit: Option<String>) -> Self {
        Self {
            path: path.into(),
            checksum,
            commit,
        }
    }

    /// Encode as two comment lines, each terminated by `\n`.
    ///
    /// Fails with [`WeaveError::InvalidHeader`] when the path is empty, spans lines or has
    /// surrounding whitespace, or when the commit is empty or contains whitespace. Those
    /// values could not be decoded back unchanged.
    pub fn encode(&self) -> Result<String> {
        validate_path(&self.path)?;

        let mut data = format!("# {}", self.checksum);
        if let Some(commit) = &self.commit {
            validate_commit(commit)?;
            data.push_str(&format!(" {COMMIT_LABEL}:{commit}"));
        }

        Ok(format!("# {HEADER_ATTRIBUTION}: {}\n{data}\n", self.path))
    }
}

fn validate_path(path: &str) -> Result<()> {
    let reason = if path.is_empty() {
        Some("path is empty")
    } else if path.contains(['\n', '\r']) {
        Some("path contains a line break")
    } else if path.trim() != path {
        Some("path has leading or trailing whitespace")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(WeaveError::InvalidHeader {
            reason: format!("{reason}: {path:?}"),
        }
        .into()),
        None => Ok(()),
    }
}

fn validate_commit(commit: &str) -> Result<()> {
    if commit.is_empty() || commit.chars().any(char::is_whitespace) {
        return Err(WeaveError::InvalidHeader {
            reason: format!("commit hash {commit:?} is empty or contains whitespace"),
        }
        .into());
    }
    Ok(())
}

struct HeaderPatterns {
    attribution: Regex,
    legacy_path: Regex,
    data: Regex,
}

impl HeaderPatterns {
    fn new() -> Result<Self> {
        let attribution = Regex::new(&format!(
            r"^# {}:(?: (?P<path>.+))?$",
            regex::escape(HEADER_ATTRIBUTION)
        ))
        .context("Invalid attribution pattern")?;
        let legacy_path =
            Regex::new(r"^#\s+(?P<path>\S.*)$").context("Invalid legacy path pattern")?;
        let data = Regex::new(&format!(
            r"^# (?P<alg>[A-Za-z0-9]+):(?P<digest>[0-9A-Fa-f]+)(?: {}:(?P<commit>\S+))?$",
            regex::escape(COMMIT_LABEL)
        ))
        .context("Invalid data line pattern")?;

        Ok(Self {
            attribution,
            legacy_path,
            data,
        })
    }
}

/// Decode every provenance header in `artifact`, in order of appearance.
///
/// Text that is not part of a header is ignored. An attribution line that is not
/// followed by a well-formed data line is an error.
pub fn decode(artifact: &str) -> Result<Vec<ProvenanceHeader>> {
    let patterns = HeaderPatterns::new()?;
    let lines: Vec<&str> = artifact.lines().map(|l| l.trim_end_matches('\r')).collect();
    let mut headers = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = patterns.attribution.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let line_no = i + 1;

        let path = if let Some(path) = caps.name("path") {
            path.as_str().to_string()
        } else {
            i += 1;
            let legacy = lines.get(i).and_then(|line| patterns.legacy_path.captures(line));
            match legacy.and_then(|c| c.name("path")) {
                Some(path) => path.as_str().trim_end().to_string(),
                None => {
                    return Err(WeaveError::InvalidHeader {
                        reason: format!("line {line_no}: attribution is not followed by a path"),
                    }
                    .into());
                }
            }
        };

        i += 1;
        let Some(data) = lines.get(i).and_then(|line| patterns.data.captures(line)) else {
            return Err(WeaveError::InvalidHeader {
                reason: format!("line {}: expected '# <algorithm>:<digest>' after header", i + 1),
            }
            .into());
        };

        let algorithm: ChecksumAlgorithm =
            data["alg"].parse().map_err(|_| WeaveError::InvalidHeader {
                reason: format!("line {}: unsupported checksum algorithm '{}'", i + 1, &data["alg"]),
            })?;
        let checksum = Checksum::new(algorithm, data["digest"].to_ascii_lowercase())
            .with_context(|| format!("Invalid checksum in header at line {line_no}"))?;
        let commit = data.name("commit").map(|m| m.as_str().to_string());

        tracing::trace!("Decoded header for {} at line {}", path, line_no);
        headers.push(ProvenanceHeader {
            path,
            checksum,
            commit,
        });
        i += 1;
    }

    Ok(headers)
}
