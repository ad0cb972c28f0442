mod cli;
mod commands;
mod facts;
mod guard;
mod node;
mod providers;
mod shell;
mod source;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Run(args) => commands::run::run(&args),
        Command::Resolve(args) => commands::resolve::run(&args),
        Command::Attrs(args) => commands::attrs::run(&args),
    }
}
