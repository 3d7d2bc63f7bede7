mod auth;
mod cli;
mod config;
mod diagnostics;
mod error;
mod output;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting PipeLens - Bitbucket Pipelines failure diagnosis");
    cli.execute().await?;

    Ok(())
}
