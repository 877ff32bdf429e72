//! Fragments: the source files a template is composed from.

pub mod locator;

pub use locator::{ModuleLocator, to_slash};

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::provenance::{Checksum, ChecksumAlgorithm};
use crate::resolver::ResolvedImport;

/// One parsed fragment or template.
#[derive(Debug, Clone)]
pub struct Fragment<M> {
    /// Canonical filesystem path; the identity of the fragment
    pub path: PathBuf,
    /// Dotted module name, or the file stem for a template outside the search path
    pub module_name: String,
    /// Raw file contents, exactly as read
    pub source: String,
    /// Parsed module
    pub module: M,
    /// Module-level names the fragment binds, imports excluded
    pub symbols: Vec<String>,
    /// Classified imports, in source order
    pub imports: Vec<ResolvedImport>,
    /// Whether this is the composition entry point
    pub is_template: bool,
}

impl<M> Fragment<M> {
    /// Checksum of the original bytes.
    #[must_use]
    pub fn checksum(&self, algorithm: ChecksumAlgorithm) -> Checksum {
        algorithm.digest(self.source.as_bytes())
    }

    /// Canonical paths of the fragments this one imports.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<PathBuf> {
        self.imports.iter().filter_map(|i| i.kind.target().map(PathBuf::from)).collect()
    }

    /// Last component of the module name.
    #[must_use]
    pub fn stem(&self) -> &str {
        self.module_name.rsplit('.').next().unwrap_or(&self.module_name)
    }
}
