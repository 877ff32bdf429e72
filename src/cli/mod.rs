//! Command-line interface for weave
//!
//! # Commands
//!
//! - `render` - flatten a template and its fragments into one artifact
//! - `locate` - find the commit that introduced content with a given checksum
//! - `index` - bring the history cache up to date
//! - `trace` - locate the source of every fragment in an artifact
//! - `headers` - list the provenance headers of an artifact
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - debug logging
//! - `--quiet` / `-q` - errors only
//! - `--config` / `-c` - explicit `weave.toml` (also `WEAVE_CONFIG`)
//! - `--no-progress` - no progress bars (also `WEAVE_NO_PROGRESS`)
//!
//! `RUST_LOG` takes precedence over `--verbose` and `--quiet` when set.

pub mod common;
mod headers;
mod index;
mod locate;
mod render;
mod trace;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::constants::NO_PROGRESS_ENV;
use common::{CommandContext, CommandExecutor};

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Default log filter; `RUST_LOG` overrides it
    pub log_level: String,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Install the global tracing subscriber, writing to stderr.
    ///
    /// Does nothing if a subscriber is already installed.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .try_init();
    }

    #[must_use]
    pub fn show_progress(&self) -> bool {
        !self.no_progress && std::env::var_os(NO_PROGRESS_ENV).is_none()
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "weave",
    about = "Compose script fragments into self-contained artifacts and trace them back to history",
    version,
    long_about = "weave flattens a template and the fragments it imports into a single source file, \
                  stamping each inlined fragment with a provenance header. The checksum in a header \
                  can later be traced back to the commit that introduced the fragment."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file to use instead of the discovered weave.toml
    #[arg(short, long, global = true, value_name = "FILE", env = "WEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a template with every imported fragment inlined
    Render(render::RenderCommand),
    /// Find the commit that introduced content with a given checksum
    Locate(locate::LocateCommand),
    /// Index every commit not yet in the history cache
    Index(index::IndexCommand),
    /// Look up every provenance header of an artifact in history
    Trace(trace::TraceCommand),
    /// Print the provenance headers of an artifact
    Headers(headers::HeadersCommand),
}

impl Cli {
    /// Set up logging and run the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        };
        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Run the selected command with explicit settings; logging is left untouched.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let ctx = CommandContext::load(config.config_path.as_deref(), config.show_progress())?;
        match self.command {
            Commands::Render(cmd) => cmd.execute_with_context(ctx).await,
            Commands::Locate(cmd) => cmd.execute_with_context(ctx).await,
            Commands::Index(cmd) => cmd.execute_with_context(ctx).await,
            Commands::Trace(cmd) => cmd.execute_with_context(ctx).await,
            Commands::Headers(cmd) => cmd.execute_with_context(ctx).await,
        }
    }
}
