//! pomwatch CLI: booster catalog watcher and effective-POM publisher.
//!
//! Walks a booster catalog, expands each member's build descriptor into its
//! effective form, and publishes the result to a descriptor store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
