//! Test utilities for weave
//!
//! Helpers shared by unit and integration tests: throwaway git repositories and
//! one-time logging setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use weave_cli::test_utils::TestGit;
//!
//! # fn example() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let git = TestGit::new(dir.path());
//! git.init_with_user()?;
//! git.write_file("lib/util.py", "def doit():\n    return 1\n")?;
//! let commit = git.commit_all("add util")?;
//! # Ok(())
//! # }
//! ```

pub mod git_helper;

pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise `RUST_LOG` if it
/// is set, otherwise leaves logging off.
///
/// ```bash
/// RUST_LOG=lookup=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
