//! Platform-specific helpers.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Whether weave is running on Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Name of the git executable to spawn.
#[must_use]
pub const fn get_git_command() -> &'static str {
    if is_windows() {
        "git.exe"
    } else {
        "git"
    }
}

/// The current user's home directory.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

/// Resolve a user-supplied path from `weave.toml` or the command line.
///
/// A leading `~/` expands to the home directory, `$VAR` and `${VAR}` expand to environment
/// variables, and relative results are taken relative to `base`.
pub fn resolve_path(path: &str, base: &Path) -> Result<PathBuf> {
    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        get_home_dir()?.join(rest).to_string_lossy().into_owned()
    } else if path == "~" {
        get_home_dir()?.to_string_lossy().into_owned()
    } else if path.starts_with('~') {
        bail!(
            "Invalid path: {path}\n\n\
             Tilde expansion only supports '~/' for the home directory."
        );
    } else {
        path.to_string()
    };

    let expanded = shellexpand::env(&expanded)
        .with_context(|| format!("Failed to expand environment variables in path: {path}"))?;
    let expanded = PathBuf::from(expanded.as_ref());

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base.join(expanded))
    }
}
