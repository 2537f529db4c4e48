//! modeldock — deploy inference runtimes on local and SSH hosts.

use clap::Parser;
use modeldock_core::StatePaths;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let paths = match &cli.home {
        Some(home) => StatePaths::new(home)?,
        None => StatePaths::from_env()?,
    };

    match &cli.command {
        Command::Validate => commands::validate(&paths),
        Command::Show => commands::show(&paths),
        Command::Plan(args) => commands::plan_cmd(&paths, args),
        Command::Up(args) => commands::up(&paths, args).await,
        Command::Status { probe } => commands::status(&paths, *probe).await,
        Command::Down { force } => commands::down(&paths, *force).await,
    }
}
