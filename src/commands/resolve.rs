//! `converge resolve`: print the version assignment without converging.

use crate::cli::CatalogArgs;
use crate::node::NodeDocument;
use crate::source::LocalCookbookSource;
use anyhow::{Context, Result};
use colored::Colorize;

pub fn run(args: &CatalogArgs) -> Result<()> {
    let document = NodeDocument::load(&args.node)?;
    let (_, run_list) = document.to_node()?;

    let source = LocalCookbookSource::scan(&args.cookbooks)?;
    let catalog = source.catalog()?;
    let resolved = cookbook::resolve(&run_list, &catalog)
        .context("dependency resolution failed")?;

    println!("run list resolves to {} cookbooks:", resolved.len());
    for (name, version) in &resolved {
        println!("  {} {version}", name.bold());
    }
    Ok(())
}
