mod cli;
mod commands;
mod config;
mod logging;
mod ui;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match cli.command {
        Command::Connect(args) => commands::session::run(args).await,
        Command::Xpub(args) => commands::xpub::run(args).await,
        Command::Sign(args) => commands::sign::run(args).await,
    }
}
