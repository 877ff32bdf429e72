//! Project configuration.
//!
//! weave reads an optional `weave.toml`. The file is taken from `--config` or
//! `WEAVE_CONFIG` when given, otherwise it is searched for in the working directory and
//! its parents. Without a file every setting has its default. Command-line flags override
//! whatever the file says.
//!
//! ```toml
//! [render]
//! search_paths = ["features", "vendor/features"]
//! algorithm = "sha256"
//! use_git = true
//! header_paths = "relative"
//! namespace = "stem"
//! literal_call_sites = ["requires", "fetch_account_data"]
//! host_modules = ["contracts_api"]
//! ignored_modules = ["contracts_api_extensions"]
//! injected_names = []
//! prune_unused = false
//! banner = true
//! strict_symbols = false
//!
//! [locate]
//! cache = ".weave-cache.json"
//! save_cache = true
//! workers = 8
//! checkpoint_interval = 500
//! all_refs = false
//! ```
//!
//! Relative paths in the file are relative to the directory holding it.

mod parser;

pub use parser::{parse_config, parse_config_str};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    CONFIG_ENV, CONFIG_FILE_NAME, DEFAULT_CACHE_FILE, DEFAULT_CHECKPOINT_INTERVAL,
    DEFAULT_HOST_MODULES, DEFAULT_IGNORED_MODULES, DEFAULT_INDEX_WORKERS, DEFAULT_LITERAL_CALL_SITES,
};
use crate::core::WeaveError;
use crate::history::IndexerOptions;
use crate::provenance::ChecksumAlgorithm;
use crate::renderer::{ComposeOptions, HeaderPathStyle, NamespaceStrategy};
use crate::resolver::ImportPolicy;
use crate::utils::platform::resolve_path;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

/// Contents of `weave.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeaveConfig {
    pub render: RenderConfig,
    pub locate: LocateConfig,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// The `[render]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Extra directories fragments are looked up in, after the template's directory
    pub search_paths: Vec<PathBuf>,
    pub algorithm: ChecksumAlgorithm,
    /// Record the last commit of every fragment in its header
    pub use_git: bool,
    pub header_paths: HeaderPathStyle,
    pub namespace: NamespaceStrategy,
    pub literal_call_sites: Vec<String>,
    pub host_modules: Vec<String>,
    pub ignored_modules: Vec<String>,
    /// Names the host runtime provides without an import
    pub injected_names: Vec<String>,
    pub prune_unused: bool,
    pub banner: bool,
    pub strict_symbols: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            algorithm: ChecksumAlgorithm::default(),
            use_git: true,
            header_paths: HeaderPathStyle::default(),
            namespace: NamespaceStrategy::default(),
            literal_call_sites: strings(DEFAULT_LITERAL_CALL_SITES),
            host_modules: strings(DEFAULT_HOST_MODULES),
            ignored_modules: strings(DEFAULT_IGNORED_MODULES),
            injected_names: Vec::new(),
            prune_unused: false,
            banner: true,
            strict_symbols: false,
        }
    }
}

/// The `[locate]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocateConfig {
    /// History cache file; defaults to `.weave-cache.json` in the repository root
    pub cache: Option<PathBuf>,
    pub save_cache: bool,
    pub workers: usize,
    pub checkpoint_interval: usize,
    /// Index commits reachable from any ref, not just `HEAD`
    pub all_refs: bool,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            cache: None,
            save_cache: true,
            workers: DEFAULT_INDEX_WORKERS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            all_refs: false,
        }
    }
}

impl WeaveConfig {
    /// Load and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = parse_config(path)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate(path)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the explicit file if one is given, else the first `weave.toml` found from `cwd`
    /// upwards, else the defaults.
    ///
    /// An explicit file that does not exist is an error.
    pub fn load_or_default(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        if let Some(path) = explicit {
            let path = if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            };
            if !path.is_file() {
                return Err(WeaveError::ConfigError {
                    message: format!("configuration file {} does not exist", path.display()),
                }
                .into());
            }
            return Self::load(&path);
        }

        match discover(cwd) {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!("No {} found; using defaults", CONFIG_FILE_NAME);
                Ok(Self::default())
            }
        }
    }

    /// Directory of the loaded file, if any.
    #[must_use]
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: String| -> Result<()> {
            Err(WeaveError::ConfigError {
                message: format!("{message} in {}", path.display()),
            }
            .into())
        };
        if self.locate.workers == 0 {
            return invalid("locate.workers must be at least 1".to_string());
        }
        if let Some(empty) = self.render.host_modules.iter().chain(&self.render.ignored_modules).find(|m| m.trim().is_empty()) {
            return invalid(format!("module names must not be empty (found {empty:?})"));
        }
        Ok(())
    }

    /// Render search paths, resolved against the file's directory or `cwd`.
    pub fn search_paths(&self, cwd: &Path) -> Result<Vec<PathBuf>> {
        let base = self.base_dir().unwrap_or(cwd);
        self.render
            .search_paths
            .iter()
            .map(|p| resolve_path(&p.to_string_lossy(), base))
            .collect()
    }

    /// History cache location for a repository rooted at `repo_root`.
    pub fn cache_path(&self, repo_root: &Path) -> Result<PathBuf> {
        match &self.locate.cache {
            Some(cache) => resolve_path(&cache.to_string_lossy(), self.base_dir().unwrap_or(repo_root)),
            None => Ok(repo_root.join(DEFAULT_CACHE_FILE)),
        }
    }

    #[must_use]
    pub fn compose_options(&self) -> ComposeOptions {
        let render = &self.render;
        ComposeOptions {
            algorithm: render.algorithm,
            namespace: render.namespace,
            header_paths: render.header_paths,
            literal_call_sites: render.literal_call_sites.clone(),
            injected_names: render.injected_names.clone(),
            prune_unused: render.prune_unused,
            banner: render.banner,
            strict_symbols: render.strict_symbols,
        }
    }

    #[must_use]
    pub fn import_policy(&self) -> ImportPolicy {
        ImportPolicy {
            host_modules: self.render.host_modules.clone(),
            ignored_modules: self.render.ignored_modules.clone(),
        }
    }

    #[must_use]
    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            workers: self.locate.workers,
            checkpoint_interval: self.locate.checkpoint_interval,
            ..IndexerOptions::default()
        }
    }
}

/// First `weave.toml` in `start` or one of its ancestors.
#[must_use]
pub fn discover(start: &Path) -> Option<PathBuf> {
    start.ancestors().map(|dir| dir.join(CONFIG_FILE_NAME)).find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = WeaveConfig::default();
        assert!(config.render.use_git);
        assert!(config.render.banner);
        assert!(config.locate.save_cache);
        assert_eq!(config.locate.workers, DEFAULT_INDEX_WORKERS);
        assert_eq!(config.compose_options(), ComposeOptions::default());
        assert_eq!(config.import_policy().host_modules, vec!["contracts_api".to_string()]);
    }

    #[test]
    fn test_load_partial_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
[render]
search_paths = ["features"]
namespace = "qualified"
algorithm = "sha512"

[locate]
cache = "cache/history.json"
workers = 2
"#,
        )
        .unwrap();

        let config = WeaveConfig::load(&path).unwrap();
        assert_eq!(config.render.namespace, NamespaceStrategy::Qualified);
        assert_eq!(config.render.algorithm, ChecksumAlgorithm::Sha512);
        assert!(config.render.banner);
        assert_eq!(config.search_paths(Path::new("/elsewhere")).unwrap(), vec![temp.path().join("features")]);
        assert_eq!(
            config.cache_path(Path::new("/repo")).unwrap(),
            temp.path().join("cache/history.json")
        );
        assert_eq!(config.indexer_options().workers, 2);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[render]\nnamespce = \"stem\"\n").unwrap();
        let err = WeaveConfig::load(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<WeaveError>(), Some(WeaveError::ConfigParseError { .. })));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[locate]\nworkers = 0\n").unwrap();
        let err = WeaveConfig::load(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<WeaveError>(), Some(WeaveError::ConfigError { .. })));
    }

    #[test]
    #[serial]
    fn test_discovery_walks_up() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "[render]\nbanner = false\n").unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(discover(&nested), Some(temp.path().join(CONFIG_FILE_NAME)));
        let config = WeaveConfig::load_or_default(None, &nested).unwrap();
        assert!(!config.render.banner);
        assert_eq!(config.base_dir(), Some(temp.path()));
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file() {
        let temp = tempfile::tempdir().unwrap();
        let err = WeaveConfig::load_or_default(Some(Path::new("nope.toml")), temp.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<WeaveError>(), Some(WeaveError::ConfigError { .. })));
    }

    #[test]
    fn test_default_cache_path() {
        let config = WeaveConfig::default();
        assert_eq!(config.cache_path(Path::new("/repo")).unwrap(), Path::new("/repo").join(DEFAULT_CACHE_FILE));
    }
}
