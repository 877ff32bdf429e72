//! Mapping between dotted module names and fragment files on the search path.

use std::path::{Path, PathBuf};
use strsim::levenshtein;
use walkdir::WalkDir;

/// File stem that turns a directory into an importable package.
const PACKAGE_INIT: &str = "__init__";

/// Maximum allowed Levenshtein distance as a percentage of the module name length for
/// "did you mean" suggestions.
const SIMILARITY_THRESHOLD_PERCENT: usize = 30;

/// How deep suggestion scans descend below a search root.
const SUGGESTION_SCAN_DEPTH: usize = 8;

/// Finds fragment files for module names.
///
/// Roots are searched in order; the first root containing a module wins.
#[derive(Debug, Clone)]
pub struct ModuleLocator {
    roots: Vec<PathBuf>,
    extension: &'static str,
}

impl ModuleLocator {
    /// Create a locator over `roots` for files with `extension` (no dot).
    ///
    /// Roots are canonicalised when they exist so that results compare equal regardless of
    /// how a root was spelled.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>, extension: &'static str) -> Self {
        let mut canonical: Vec<PathBuf> = Vec::new();
        for root in roots {
            let root = root.canonicalize().unwrap_or(root);
            if !canonical.contains(&root) {
                canonical.push(root);
            }
        }
        Self {
            roots: canonical,
            extension,
        }
    }

    /// Search roots in priority order.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Append a lower-priority root.
    pub fn push_root(&mut self, root: PathBuf) {
        let root = root.canonicalize().unwrap_or(root);
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    /// Canonical path of the file implementing `module`, if any.
    ///
    /// `a.b.c` resolves to `a/b/c.<ext>` or, for packages, `a/b/c/__init__.<ext>`.
    #[must_use]
    pub fn find(&self, module: &str) -> Option<PathBuf> {
        if module.is_empty() || module.split('.').any(str::is_empty) {
            return None;
        }
        let relative: PathBuf = module.split('.').collect();

        for root in &self.roots {
            let base = root.join(&relative);
            let candidates = [
                base.with_extension(self.extension),
                base.join(PACKAGE_INIT).with_extension(self.extension),
            ];
            if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
                tracing::trace!("Module {} found at {}", module, found.display());
                return Some(found.canonicalize().unwrap_or(found));
            }
        }
        None
    }

    /// The root `path` lives under, and the path relative to it.
    fn split_root<'p>(&self, path: &'p Path) -> Option<(&Path, &'p Path)> {
        self.roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok().map(|rel| (root.as_path(), rel)))
    }

    /// Dotted module name of a fragment file, if it lives under a search root.
    #[must_use]
    pub fn module_name_for(&self, path: &Path) -> Option<String> {
        let (_, relative) = self.split_root(path)?;
        let mut parts: Vec<String> = relative
            .iter()
            .map(|part| part.to_string_lossy().into_owned())
            .collect();
        let last = parts.pop()?;
        let stem = last.strip_suffix(&format!(".{}", self.extension))?.to_string();
        if stem != PACKAGE_INIT {
            parts.push(stem);
        }
        if parts.is_empty() { None } else { Some(parts.join(".")) }
    }

    /// Whether `path` is a package initialiser.
    #[must_use]
    pub fn is_package(&self, path: &Path) -> bool {
        path.file_stem().is_some_and(|stem| stem == PACKAGE_INIT)
    }

    /// `path` relative to its search root, `/`-separated.
    #[must_use]
    pub fn relative_display(&self, path: &Path) -> Option<String> {
        let (_, relative) = self.split_root(path)?;
        Some(to_slash(relative))
    }

    /// Closest existing module name to `module`, for error messages.
    #[must_use]
    pub fn suggest(&self, module: &str) -> Option<String> {
        let threshold = module.len() * SIMILARITY_THRESHOLD_PERCENT / 100;
        let mut best: Option<(usize, String)> = None;

        for root in &self.roots {
            let entries = WalkDir::new(root)
                .max_depth(SUGGESTION_SCAN_DEPTH)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file());

            for entry in entries {
                let Some(candidate) = self.module_name_for(entry.path()) else {
                    continue;
                };
                let distance = levenshtein(module, &candidate);
                if distance <= threshold && best.as_ref().is_none_or(|(d, _)| distance < *d) {
                    best = Some((distance, candidate));
                }
            }
        }

        best.map(|(_, name)| name)
    }
}

/// Render a relative path with `/` separators on every platform.
pub fn to_slash(path: &Path) -> String {
    path.iter().map(|part| part.to_string_lossy()).collect::<Vec<_>>().join("/")
}
