//! Error handling for weave
//!
//! This module provides the strongly-typed error enum used across the crate and the
//! user-facing error reporting used by the CLI. The error system follows two rules:
//! 1. **Strongly-typed errors** so callers can match on precise failure modes
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Composition**: [`WeaveError::UnresolvedFragment`], [`WeaveError::CyclicFragmentGraph`],
//!   [`WeaveError::SymbolCollision`], [`WeaveError::FragmentParseError`], and friends.
//!   These abort a render before any output is written.
//! - **Lookup**: [`WeaveError::NoMatchingSource`], [`WeaveError::CacheCorrupt`],
//!   [`WeaveError::CacheAlgorithmMismatch`].
//! - **Git**: [`WeaveError::GitCommandError`], [`WeaveError::GitNotFound`],
//!   [`WeaveError::GitRepoInvalid`].
//! - **File system and configuration**: [`WeaveError::FileSystemError`],
//!   [`WeaveError::ConfigParseError`], [`WeaveError::OutputExists`].
//!
//! Use [`user_friendly_error`] to turn any [`anyhow::Error`] into an [`ErrorContext`]
//! carrying details and a suggestion.
//!
//! # Examples
//!
//! ```rust,no_run
//! use weave_cli::core::{ErrorContext, WeaveError, user_friendly_error};
//!
//! let error = WeaveError::NoMatchingSource {
//!     checksum: "sha256:00ff".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//!
//! let manual = ErrorContext::new(WeaveError::GitNotFound)
//!     .with_suggestion("Install git from https://git-scm.com/");
//! println!("{manual}");
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for weave operations
///
/// Each variant describes one failure mode and carries the paths, names, or
/// checksums a user needs to act on it.
#[derive(Error, Debug, Clone)]
pub enum WeaveError {
    /// Git operation failed during execution
    ///
    /// # Fields
    /// - `operation`: The git operation that failed (e.g., "log", "diff-tree", "cat-file")
    /// - `stderr`: The error output from the git command
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Git executable not found in PATH
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// The directory is not inside a git work tree
    #[error("Not a valid git repository: {path}")]
    GitRepoInvalid {
        /// The path that was expected to be inside a repository
        path: String,
    },

    /// An imported module is neither a fragment on the search path nor an allowed native
    #[error("Cannot resolve fragment '{module}' imported by {importer}")]
    UnresolvedFragment {
        /// Dotted module name from the import statement
        module: String,
        /// Display path of the importing fragment or template
        importer: String,
        /// Closest known fragment module, if any
        suggestion: Option<String>,
    },

    /// An import names a native module member that the host runtime does not provide
    #[error("'{name}' cannot be imported from '{module}' in {importer}")]
    DisallowedImport {
        /// Native module name
        module: String,
        /// Imported member, or `*` for a whole-module import
        name: String,
        /// Display path of the importing file
        importer: String,
    },

    /// The fragment import graph contains a cycle
    #[error("Cyclic fragment imports detected: {chain}")]
    CyclicFragmentGraph {
        /// The full cycle, e.g. `a.py → b.py → a.py`
        chain: String,
    },

    /// Two definitions map to the same top-level name in the rendered artifact
    #[error("Symbol '{name}' is defined by both {first} and {second}")]
    SymbolCollision {
        /// The colliding name after namespacing
        name: String,
        /// Source of the first definition
        first: String,
        /// Source of the second definition
        second: String,
    },

    /// A fragment or template could not be parsed
    #[error("Failed to parse {path} at line {line}: {reason}")]
    FragmentParseError {
        /// Display path of the offending file
        path: String,
        /// 1-based line of the failure
        line: usize,
        /// What the parser expected
        reason: String,
    },

    /// A name is referenced through an import but is not defined by the imported fragment,
    /// or a free name resolves to nothing in the rendered artifact
    #[error("Unresolved symbol '{name}' in {fragment}")]
    UnresolvedSymbol {
        /// The unresolved name
        name: String,
        /// Display path of the referencing file
        fragment: String,
    },

    /// A provenance header could not be encoded or decoded
    #[error("Invalid provenance header: {reason}")]
    InvalidHeader {
        /// Why the header was rejected
        reason: String,
    },

    /// No commit in the repository history produced the requested checksum
    #[error("No commit in history contains a file with checksum {checksum}")]
    NoMatchingSource {
        /// The checksum that was searched for
        checksum: String,
    },

    /// The history cache file exists but cannot be decoded
    #[error("History cache {path} is corrupt: {reason}")]
    CacheCorrupt {
        /// Path of the cache file
        path: String,
        /// Decoder message
        reason: String,
    },

    /// The history cache was built with a different checksum algorithm
    #[error("History cache {path} was built with {found}, but {expected} was requested")]
    CacheAlgorithmMismatch {
        /// Path of the cache file
        path: String,
        /// Algorithm of the query
        expected: String,
        /// Algorithm recorded in the cache
        found: String,
    },

    /// Content read back from history does not hash to the expected checksum
    #[error("Checksum mismatch for '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Path or name of the content
        name: String,
        /// Expected checksum
        expected: String,
        /// Computed checksum
        actual: String,
    },

    /// Configuration file could not be parsed
    #[error("Invalid configuration file syntax in {file}")]
    ConfigParseError {
        /// Path to the configuration file
        file: String,
        /// Parser message
        reason: String,
    },

    /// Configuration is semantically invalid
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// The render target already exists and overwriting was not requested
    #[error("Output file {path} already exists")]
    OutputExists {
        /// Path of the existing file
        path: String,
    },

    /// File system operation failed
    #[error("File system error during {operation}: {path}")]
    FileSystemError {
        /// The operation that failed
        operation: String,
        /// The path involved
        path: String,
    },

    /// Insufficient permissions
    #[error("Permission denied: {operation} on {path}")]
    PermissionDenied {
        /// The operation that failed
        operation: String,
        /// The path involved
        path: String,
    },

    /// Generic error with a message
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

/// Error context wrapper that adds a suggestion and details to a [`WeaveError`]
///
/// Displayed with colors on stderr by [`ErrorContext::display`]:
/// - Error message: red and bold
/// - Details: yellow
/// - Suggestion: green
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: WeaveError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: WeaveError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add an actionable suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details and suggestion to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`WeaveError`] anywhere in the chain, [`std::io::Error`] and
/// [`toml::de::Error`]. Anything else is reported with its full cause chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(weave_error) = error.downcast_ref::<WeaveError>() {
        return create_error_context(weave_error.clone());
    }

    for cause in error.chain() {
        if let Some(weave_error) = cause.downcast_ref::<WeaveError>() {
            return create_error_context(weave_error.clone());
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(WeaveError::PermissionDenied {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check file ownership and permissions")
                .with_details("weave could not read or write a file");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(WeaveError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(WeaveError::ConfigParseError {
            file: "weave.toml".to_string(),
            reason: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in weave.toml");
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(WeaveError::Other {
        message,
    })
}

fn create_error_context(error: WeaveError) -> ErrorContext {
    match &error {
        WeaveError::GitNotFound => ErrorContext::new(error.clone())
            .with_suggestion("Install git from https://git-scm.com/ or your package manager (e.g., 'brew install git', 'apt install git')")
            .with_details("weave reads commit history and blobs through the git command line"),

        WeaveError::GitCommandError { operation, stderr } => ErrorContext::new(error.clone())
            .with_suggestion(match operation.as_str() {
                "cat-file" => "The path may not exist at that commit. Check it with 'git show <commit>:<path>'",
                "rev-parse" => "Check that the commit exists with 'git log --oneline'",
                _ => "Try running the git command manually for more details",
            })
            .with_details(stderr.trim().to_string()),

        WeaveError::GitRepoInvalid { path } => ErrorContext::new(error.clone())
            .with_suggestion(format!("Run weave inside a git work tree, or initialise one in {path}"))
            .with_details("Locating sources and recording commits in headers both need a repository"),

        WeaveError::UnresolvedFragment { module, suggestion, .. } => {
            let ctx = ErrorContext::new(error.clone()).with_details(format!(
                "'{module}' is not an allowed native module and no matching file was found on the fragment search path"
            ));
            match suggestion {
                Some(candidate) => ctx.with_suggestion(format!("Did you mean '{candidate}'?")),
                None => ctx.with_suggestion(
                    "Add the directory containing the fragment with --include, or to [render].search_paths in weave.toml",
                ),
            }
        }

        WeaveError::DisallowedImport { module, .. } => ErrorContext::new(error.clone())
            .with_suggestion(format!("Only the members listed in the native table may be imported from '{module}'"))
            .with_details("The host runtime exposes a fixed set of native modules and names"),

        WeaveError::CyclicFragmentGraph { chain } => ErrorContext::new(error.clone())
            .with_suggestion("Move the shared definitions into a separate fragment that both sides import")
            .with_details(format!("Fragments cannot import themselves directly or indirectly: {chain}")),

        WeaveError::SymbolCollision { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Rename one of the definitions, or set namespace = \"qualified\" in [render]")
            .with_details("Namespaced names must be unique across the rendered artifact"),

        WeaveError::UnresolvedSymbol { name, .. } => ErrorContext::new(error.clone())
            .with_suggestion(format!("Check that '{name}' is defined at the top level of the imported fragment"))
            .with_details("Every cross-fragment reference must resolve to a definition in the composed set"),

        WeaveError::NoMatchingSource { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check the checksum and that the file was committed to this repository")
            .with_details("The entire history was indexed without finding a file with this checksum"),

        WeaveError::CacheCorrupt { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Delete the cache file or pass a fresh path with --cache")
            .with_details("The cache is rebuilt from history when it is missing"),

        WeaveError::CacheAlgorithmMismatch { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Use a separate cache file per checksum algorithm with --cache"),

        WeaveError::OutputExists { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Pass --force to overwrite the existing file"),

        WeaveError::ConfigParseError { file, .. } => ErrorContext::new(error.clone())
            .with_suggestion(format!("Check the TOML syntax in {file}")),

        WeaveError::ChecksumMismatch { .. } => ErrorContext::new(error.clone())
            .with_details("The content read from history does not match the requested checksum"),

        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = WeaveError::GitNotFound;
        assert_eq!(error.to_string(), "Git is not installed or not found in PATH");

        let error = WeaveError::SymbolCollision {
            name: "util_doit".to_string(),
            first: "features/util.py".to_string(),
            second: "other/util.py".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Symbol 'util_doit' is defined by both features/util.py and other/util.py"
        );

        let error = WeaveError::NoMatchingSource {
            checksum: "sha256:abc".to_string(),
        };
        assert!(error.to_string().contains("sha256:abc"));
    }

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new(WeaveError::GitNotFound)
            .with_suggestion("Install git")
            .with_details("git is required");

        let display = format!("{ctx}");
        assert!(display.contains("Git is not installed or not found in PATH"));
        assert!(display.contains("Details: git is required"));
        assert!(display.contains("Suggestion: Install git"));
    }

    #[test]
    fn test_user_friendly_error_finds_typed_error_behind_context() {
        use anyhow::Context;

        let result: anyhow::Result<()> = Err(WeaveError::CyclicFragmentGraph {
            chain: "a.py → b.py → a.py".to_string(),
        }
        .into());
        let error = result.context("Failed to render template").unwrap_err();

        let ctx = user_friendly_error(error);
        assert!(matches!(ctx.error, WeaveError::CyclicFragmentGraph { .. }));
        assert!(ctx.details.unwrap().contains("a.py → b.py → a.py"));
    }

    #[test]
    fn test_unresolved_fragment_uses_candidate_as_suggestion() {
        let error = WeaveError::UnresolvedFragment {
            module: "features.utl".to_string(),
            importer: "template.py".to_string(),
            suggestion: Some("features.util".to_string()),
        };
        let ctx = user_friendly_error(error.into());
        assert_eq!(ctx.suggestion.as_deref(), Some("Did you mean 'features.util'?"));
    }

    #[test]
    fn test_user_friendly_error_not_found() {
        use std::io::{Error, ErrorKind};

        let ctx = user_friendly_error(Error::new(ErrorKind::NotFound, "missing").into());
        assert!(matches!(ctx.error, WeaveError::FileSystemError { .. }));
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_generic_error_keeps_cause_chain() {
        use anyhow::Context;

        let result: anyhow::Result<()> = Err(anyhow::anyhow!("root cause"));
        let ctx = user_friendly_error(result.context("outer").unwrap_err());
        match ctx.error {
            WeaveError::Other {
                message,
            } => {
                assert!(message.contains("outer"));
                assert!(message.contains("root cause"));
            }
            other => panic!("Expected Other, got {other:?}"),
        }
    }
}
