//! Cross-platform utilities
//!
//! - [`fs`] - atomic file writes and directory creation
//! - [`platform`] - git executable lookup and user path resolution
//! - [`progress`] - progress bars that respect `--no-progress`

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir};
pub use platform::{get_git_command, get_home_dir, is_windows, resolve_path};
pub use progress::ProgressBar;
