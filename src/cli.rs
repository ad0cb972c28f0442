//! CLI definitions for converge.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "converge",
    about = "Converge this machine to declared state from versioned cookbooks",
    version
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a full convergence: resolve, compile, apply, report
    Run(RunArgs),

    /// Resolve the run list against the cookbook catalog and print the
    /// version assignment, without touching the system
    Resolve(CatalogArgs),

    /// Print a node's merged attribute view
    Attrs(AttrsArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Node document (TOML: name, run_list, attribute layers)
    #[arg(short, long)]
    pub node: PathBuf,

    /// Directory containing cookbooks
    #[arg(short, long, default_value_os_t = default_cookbook_path())]
    pub cookbooks: PathBuf,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Emit the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Don't write the node document back after the run
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Args)]
pub struct CatalogArgs {
    /// Node document (TOML)
    #[arg(short, long)]
    pub node: PathBuf,

    /// Directory containing cookbooks
    #[arg(short, long, default_value_os_t = default_cookbook_path())]
    pub cookbooks: PathBuf,
}

#[derive(Args)]
pub struct AttrsArgs {
    /// Node document (TOML)
    #[arg(short, long)]
    pub node: PathBuf,

    /// Print only the value at this dotted path
    #[arg(short, long)]
    pub path: Option<String>,
}

/// Default cookbook location: `~/.converge/cookbooks`, falling back to the
/// working directory when no home exists.
fn default_cookbook_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".converge").join("cookbooks"))
        .unwrap_or_else(|| PathBuf::from("cookbooks"))
}
