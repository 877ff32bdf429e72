//! Global constants used throughout weave.
//!
//! File names, header text, format versions and the numeric defaults used by
//! more than one module live here.

use std::time::Duration;

/// Name of the project configuration file searched for in the working directory
/// and its parents.
pub const CONFIG_FILE_NAME: &str = "weave.toml";

/// Default location of the persisted history index, relative to the repository root.
pub const DEFAULT_CACHE_FILE: &str = ".weave-cache.json";

/// Format version written into the history index. Readers reject newer versions.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Attribution text that opens every provenance header.
pub const HEADER_ATTRIBUTION: &str = "Objects below have been imported from";

/// Label that precedes the commit hash on the header data line.
pub const COMMIT_LABEL: &str = "git";

/// Callee names whose arguments the host runtime requires to be literals.
pub const DEFAULT_LITERAL_CALL_SITES: &[&str] = &["requires", "fetch_account_data"];

/// Host API modules from which every name may be imported.
pub const DEFAULT_HOST_MODULES: &[&str] = &["contracts_api"];

/// Development-only modules whose imports are dropped from rendered output.
pub const DEFAULT_IGNORED_MODULES: &[&str] = &["contracts_api_extensions"];

/// Number of commits whose blobs are read and checksummed concurrently.
pub const DEFAULT_INDEX_WORKERS: usize = 8;

/// Newly indexed commits between intermediate cache saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 500;

/// Timeout for a single git invocation while walking history.
///
/// Blob reads and tree diffs on large repositories stay well below this.
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Environment variable that disables progress bars.
pub const NO_PROGRESS_ENV: &str = "WEAVE_NO_PROGRESS";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "WEAVE_CONFIG";
