//! Subcommand implementations.

pub mod attrs;
pub mod resolve;
pub mod run;
