//! scriptsync CLI: reconcile lecture script outlines with their lecture.
//!
//! Checks a script's bookmark outline for contradictions against the
//! lecture's chapters and sections, and imports it when it is consistent.

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
