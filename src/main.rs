//! weave CLI entry point
//!
//! Parses arguments, runs the command and turns any error into a readable message with
//! exit code 1.

use anyhow::Result;
use clap::Parser;
use weave_cli::cli;
use weave_cli::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
