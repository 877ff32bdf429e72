//! List the provenance headers of a rendered artifact.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::common::{CommandContext, CommandExecutor};
use crate::provenance::decode;

/// Print the provenance headers of an artifact
#[derive(Args, Debug)]
pub struct HeadersCommand {
    /// Rendered artifact
    #[arg(value_name = "ARTIFACT")]
    pub artifact: PathBuf,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl CommandExecutor for HeadersCommand {
    async fn execute_with_context(self, ctx: CommandContext) -> Result<()> {
        let path = ctx.absolute(&self.artifact);
        let artifact = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let headers = decode(&artifact)?;

        if self.json {
            let rows: Vec<serde_json::Value> = headers
                .iter()
                .map(|h| {
                    serde_json::json!({
                        "path": h.path,
                        "checksum": h.checksum.to_string(),
                        "commit": h.commit,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        for header in &headers {
            match &header.commit {
                Some(commit) => println!("{}\t{}\t{}", header.path, header.checksum, commit),
                None => println!("{}\t{}", header.path, header.checksum),
            }
        }
        Ok(())
    }
}
