//! `converge attrs`: inspect a node's merged attribute view.

use crate::cli::AttrsArgs;
use crate::facts;
use crate::node::NodeDocument;
use anyhow::{Result, bail};
use serde_json::Value;

pub fn run(args: &AttrsArgs) -> Result<()> {
    let document = NodeDocument::load(&args.node)?;
    let (mut node, _) = document.to_node()?;
    facts::collect(&mut node)?;

    match &args.path {
        Some(path) => match node.attrs.read(path) {
            Some(value) => print_value(&value)?,
            None => bail!("no attribute at '{path}'"),
        },
        None => print_value(&Value::Object(node.attrs.merged_view()))?,
    }
    Ok(())
}

fn print_value(value: &Value) -> Result<()> {
    // Bare strings print without quotes so the output is shell-friendly.
    match value {
        Value::String(s) => println!("{s}"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}
