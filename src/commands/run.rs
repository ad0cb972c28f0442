//! `converge run`: the full pipeline from node document to applied state.

use crate::cli::RunArgs;
use crate::guard::ShellGuardEvaluator;
use crate::node::NodeDocument;
use crate::source::LocalCookbookSource;
use crate::{facts, providers};
use anyhow::{Context, Result};
use colored::Colorize;
use convergent::{ConvergeOptions, Engine, Outcome, RunContext, RunReport, compile};
use std::time::Duration;

pub fn run(args: &RunArgs) -> Result<()> {
    let mut document = NodeDocument::load(&args.node)?;
    let (mut node, run_list) = document.to_node()?;
    facts::collect(&mut node)?;

    let source = LocalCookbookSource::scan(&args.cookbooks)?;
    let catalog = source.catalog()?;
    let resolved = cookbook::resolve(&run_list, &catalog)
        .context("dependency resolution failed")?;

    let mut collection = compile(&run_list, &resolved, &source, &mut node)?;
    let mut ctx = RunContext::new(node, resolved);

    let registry = providers::default_registry();
    let guards = ShellGuardEvaluator;
    let engine = Engine::new(&registry, &guards).with_options(ConvergeOptions {
        timeout: args.timeout.map(Duration::from_secs),
    });

    let outcome = engine.converge(&mut collection, &mut ctx);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ctx.report)?);
    } else {
        print_report(&ctx.report);
    }

    // The node document keeps the last merged view and run timestamp even
    // after a partial run; it reflects what actually happened.
    if !args.no_save {
        document.record_run(&ctx.node);
        document
            .save(&args.node)
            .with_context(|| format!("saving node document {}", args.node.display()))?;
    }

    outcome.map_err(Into::into)
}

fn print_report(report: &RunReport) {
    for entry in &report.entries {
        let line = format!("{} ({})", entry.resource, entry.action);
        match &entry.outcome {
            Outcome::Updated => println!("  {} {line}", "✓".green()),
            Outcome::UpToDate => {
                println!("  {} {} (up to date)", "○".dimmed(), line.dimmed());
            }
            Outcome::Skipped { reason } => {
                println!("  {} {line} (skipped: {reason})", "⊘".yellow());
            }
            Outcome::Failed { error } => {
                println!("  {} {line}: {}", "✗".red(), error.red());
            }
        }
    }

    let summary = report.summary();
    let status = if summary.is_success() {
        "converged".green().bold()
    } else {
        "failed".red().bold()
    };
    println!(
        "\n{status}: {} updated, {} up to date, {} skipped, {} failed",
        summary.updated, summary.up_to_date, summary.skipped, summary.failed
    );
}
