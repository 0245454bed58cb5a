//! hashstack CLI: build and publish content-addressed hash trees.
//!
//! Fetches excerpts into units, packages units into bundles and bundles into
//! a super-bundle, then publishes only the super-bundle.

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
