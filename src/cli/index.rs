//! Bring the history cache up to date without looking anything up.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::{CommandContext, CommandExecutor, HistoryArgs};

/// Index every commit not yet in the history cache
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(flatten)]
    pub history: HistoryArgs,
}

impl CommandExecutor for IndexCommand {
    async fn execute_with_context(self, ctx: CommandContext) -> Result<()> {
        let algorithm = self.history.algorithm(&ctx);
        let mut session = self.history.open(&ctx, algorithm).await?;

        let scan = session
            .engine
            .indexer()
            .index_new_commits(&mut session.index, None, Some(&session.store))
            .await;
        session.store.save(&session.index).await?;
        let outcome = scan?;

        if outcome.interrupted {
            println!(
                "{} after {} of {} new commit(s); progress saved",
                "Interrupted".yellow().bold(),
                outcome.indexed,
                outcome.pending
            );
        } else {
            println!("{} {} new commit(s)", "Indexed".green().bold(), outcome.indexed);
        }
        println!(
            "  {} commits, {} checksums in {}",
            session.index.commit_count(),
            session.index.checksum_count(),
            session.store.path().display()
        );
        if !session.store.persists() {
            println!("  {}", "(cache not saved)".dimmed());
        }
        Ok(())
    }
}
