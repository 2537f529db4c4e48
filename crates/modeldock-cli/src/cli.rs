//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "modeldock")]
#[command(version, about = "Deploy inference runtimes on local and SSH hosts", long_about = None)]
pub struct Cli {
    /// State directory holding runtimes.json, the lock and the active record.
    #[arg(long, global = true, env = "MODELDOCK_HOME")]
    pub home: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate runtimes.json and print its warnings
    Validate,
    /// Print the catalog with secrets redacted
    Show,
    /// Resolve a model to a host/backend and print the steps
    Plan(PlanArgs),
    /// Deploy a model
    Up(UpArgs),
    /// Show the active runtime
    Status {
        /// Query the endpoint's /models route
        #[arg(long)]
        probe: bool,
    },
    /// Stop the active runtime
    Down {
        /// Offer to take over a lock held by a live process
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Model id
    pub model: String,

    /// Run on this host instead of the model's host policy
    #[arg(long)]
    pub host: Option<String>,

    /// Use this backend instead of the model's backend policy
    #[arg(long)]
    pub backend: Option<String>,

    /// Redeploy even if a matching healthy instance is running
    #[arg(long)]
    pub force_restart: bool,

    /// Keep the catalog's probe timeout/interval as-is
    #[arg(long)]
    pub no_tune: bool,

    /// Print JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UpArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Offer to take over a lock held by a live process
    #[arg(long)]
    pub force: bool,

    /// Show what would run without running it
    #[arg(long)]
    pub dry_run: bool,
}
