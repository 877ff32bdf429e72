//! Content checksums used by provenance headers and the history index.
//!
//! Checksums are always taken over raw bytes: the original fragment file for headers,
//! the committed blob for the history index. Both sides must agree on the algorithm,
//! so the algorithm travels with the digest as `<algorithm>:<hex digest>`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::core::WeaveError;

/// Supported hashing algorithms.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// SHA-256, 64 hex characters
    #[default]
    Sha256,
    /// SHA-512, 128 hex characters
    Sha512,
}

impl ChecksumAlgorithm {
    /// Label used in headers and checksum strings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of a hex-encoded digest.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Hash `bytes` with this algorithm.
    #[must_use]
    pub fn digest(self, bytes: &[u8]) -> Checksum {
        let digest = match self {
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        };
        Checksum {
            algorithm: self,
            digest,
        }
    }

    /// Whether `digest` is well-formed for this algorithm (lowercase hex, exact length).
    #[must_use]
    pub fn is_valid_digest(self, digest: &str) -> bool {
        digest.len() == self.hex_len()
            && digest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = WeaveError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(WeaveError::ConfigError {
                message: format!("Unsupported checksum algorithm '{other}' (expected sha256 or sha512)"),
            }),
        }
    }
}

/// A digest together with the algorithm that produced it.
///
/// # Examples
///
/// ```rust
/// use weave_cli::provenance::{Checksum, ChecksumAlgorithm};
///
/// let checksum = ChecksumAlgorithm::Sha256.digest(b"def doit():\n    return 1\n");
/// let parsed = Checksum::parse(&checksum.to_string(), ChecksumAlgorithm::Sha256).unwrap();
/// assert_eq!(parsed, checksum);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    digest: String,
}

impl Checksum {
    /// Build a checksum from parts, validating the digest.
    pub fn new(algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Result<Self> {
        let digest = digest.into();
        if !algorithm.is_valid_digest(&digest) {
            return Err(WeaveError::InvalidHeader {
                reason: format!(
                    "'{digest}' is not a {} digest ({} lowercase hex characters)",
                    algorithm,
                    algorithm.hex_len()
                ),
            }
            .into());
        }
        Ok(Self {
            algorithm,
            digest,
        })
    }

    /// Checksum of a file's bytes.
    pub fn of_file(algorithm: ChecksumAlgorithm, path: &Path) -> Result<Self> {
        let content = std::fs::read(path).with_context(|| {
            format!("Cannot read file for checksum calculation: {}", path.display())
        })?;
        Ok(algorithm.digest(&content))
    }

    /// Parse `<algorithm>:<digest>`, or a bare digest using `default_algorithm`.
    ///
    /// Uppercase hex is accepted and normalised.
    pub fn parse(input: &str, default_algorithm: ChecksumAlgorithm) -> Result<Self> {
        let input = input.trim();
        let (algorithm, digest) = match input.split_once(':') {
            Some((alg, digest)) => (alg.parse::<ChecksumAlgorithm>()?, digest),
            None => (default_algorithm, input),
        };
        Self::new(algorithm, digest.to_ascii_lowercase())
    }

    /// The algorithm that produced this digest.
    #[must_use]
    pub const fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Hex digest without the algorithm prefix.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Whether `bytes` hash to this checksum.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.algorithm.digest(bytes) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sha256_digest() {
        let checksum = ChecksumAlgorithm::Sha256.digest(b"hello");
        assert_eq!(
            checksum.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sha512_length() {
        let checksum = ChecksumAlgorithm::Sha512.digest(b"hello");
        assert_eq!(checksum.digest().len(), 128);
        assert_eq!(checksum.algorithm(), ChecksumAlgorithm::Sha512);
    }

    #[test]
    fn test_parse_bare_digest_uses_default() {
        let digest = ChecksumAlgorithm::Sha256.digest(b"x").digest().to_uppercase();
        let parsed = Checksum::parse(&digest, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(parsed, ChecksumAlgorithm::Sha256.digest(b"x"));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(Checksum::parse("sha256:abcd", ChecksumAlgorithm::Sha256).is_err());
        assert!(Checksum::parse("md5:abcd", ChecksumAlgorithm::Sha256).is_err());
    }

    #[test]
    fn test_matches_binary_content() {
        let bytes = [0u8, 159, 146, 150, 255];
        let checksum = ChecksumAlgorithm::Sha256.digest(&bytes);
        assert!(checksum.matches(&bytes));
        assert!(!checksum.matches(b"other"));
    }

    #[test]
    fn test_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frag.py");
        std::fs::write(&path, "X = 1\n").unwrap();
        let checksum = Checksum::of_file(ChecksumAlgorithm::Sha256, &path).unwrap();
        assert_eq!(checksum, ChecksumAlgorithm::Sha256.digest(b"X = 1\n"));
    }
}
