//! Locate the source of every fragment in a rendered artifact.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::common::{CommandContext, CommandExecutor, HistoryArgs, print_match};
use crate::core::WeaveError;
use crate::provenance::decode;

/// Look up every provenance header of an artifact in history
#[derive(Args, Debug)]
pub struct TraceCommand {
    /// Rendered artifact
    #[arg(value_name = "ARTIFACT")]
    pub artifact: PathBuf,

    /// Write every recovered fragment under this directory at its original path
    #[arg(long, value_name = "DIR")]
    pub restore_dir: Option<PathBuf>,

    #[command(flatten)]
    pub history: HistoryArgs,
}

impl CommandExecutor for TraceCommand {
    async fn execute_with_context(self, ctx: CommandContext) -> Result<()> {
        let path = ctx.absolute(&self.artifact);
        let artifact = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;

        let Some(first) = decode(&artifact)?.into_iter().next() else {
            println!("No provenance headers in {}", path.display());
            return Ok(());
        };
        let mut session = self.history.open(&ctx, first.checksum.algorithm()).await?;

        let entries = session.engine.trace(&mut session.index, &artifact).await?;
        let found = entries.iter().filter(|e| e.found.is_some()).count();
        for entry in &entries {
            println!("{} {}", entry.header.path.bold(), entry.header.checksum.to_string().dimmed());
            match &entry.found {
                Some(result) => print_match(result, "  "),
                None => println!("  {}", "no commit contains this content".red()),
            }
        }
        println!("{found} of {} fragment(s) located", entries.len());

        if let Some(dir) = &self.restore_dir {
            let dir = ctx.absolute(dir);
            let written = session.engine.restore(&entries, &dir).await?;
            println!("{} {} file(s) under {}", "Restored".green().bold(), written.len(), dir.display());
        }

        if found < entries.len() {
            return Err(WeaveError::Other {
                message: format!("{} fragment(s) could not be located", entries.len() - found),
            }
            .into());
        }
        Ok(())
    }
}
