//! Find the commit a piece of content came from.
//!
//! ```bash
//! weave locate sha256:9f86d08188... --commit 4b2e1c0
//! weave locate 9f86d08188... --path lib/util.py --show-source
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::common::{CommandContext, CommandExecutor, HistoryArgs, print_match, write_output};
use crate::lookup::LookupQuery;
use crate::provenance::Checksum;

/// Find the commit that introduced content with a given checksum
#[derive(Args, Debug)]
pub struct LocateCommand {
    /// Checksum as `<algorithm>:<hex>` or bare hex
    #[arg(value_name = "CHECKSUM")]
    pub checksum: String,

    /// Commit expected to contain the content
    #[arg(long, value_name = "COMMIT")]
    pub commit: Option<String>,

    /// Only accept matches at this repository path
    #[arg(long, value_name = "PATH")]
    pub path: Option<String>,

    /// Print the recovered source after the report
    #[arg(long)]
    pub show_source: bool,

    /// Write the recovered source to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file
    #[arg(short, long)]
    pub force: bool,

    #[command(flatten)]
    pub history: HistoryArgs,
}

impl CommandExecutor for LocateCommand {
    async fn execute_with_context(self, ctx: CommandContext) -> Result<()> {
        let checksum = Checksum::parse(&self.checksum, self.history.algorithm(&ctx))?;
        let mut session = self.history.open(&ctx, checksum.algorithm()).await?;

        let query = LookupQuery::new(checksum).with_hint(self.commit.clone()).with_path(self.path.clone());
        let result = session.engine.lookup(&mut session.index, &query).await?;

        println!("{} {}", "Found".green().bold(), result.checksum);
        print_match(&result, "  ");
        if result.from_cache() {
            println!("  {}", "(answered from cache)".dimmed());
        } else {
            println!("  {}", format!("(scanned {} commit(s))", result.scanned).dimmed());
        }

        if self.show_source || self.output.is_some() {
            let source = session.engine.recover_source(&result).await?;
            if let Some(output) = &self.output {
                let output = ctx.absolute(output);
                write_output(&output, &source, self.force)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                eprintln!("{} {}", "Wrote".green().bold(), output.display());
            }
            if self.show_source {
                println!();
                print!("{}", String::from_utf8_lossy(&source));
            }
        }
        Ok(())
    }
}
