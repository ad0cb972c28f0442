//! The on-disk node document.
//!
//! A node document is one TOML file holding the node's name, its run list,
//! and the three locally-authored attribute layers. The automatic layer is
//! never persisted as input - it is rediscovered before every run - but the
//! final merged view is written back after a run so the surrounding tooling
//! can see what the node converged with.

use anyhow::{Context, Result};
use attrset::Layer;
use chrono::{DateTime, Utc};
use convergent::Node;
use cookbook::RunList;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Serialized form of a node.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct NodeDocument {
    /// Node name
    pub name: String,

    /// Ordered run list entries, e.g. `["base", "nginx::ssl@1.2"]`
    #[serde(default)]
    pub run_list: Vec<String>,

    /// Default-layer attributes
    #[serde(default, rename = "default")]
    pub default_attrs: Map<String, Value>,

    /// Normal-layer attributes
    #[serde(default, rename = "normal")]
    pub normal_attrs: Map<String, Value>,

    /// Override-layer attributes
    #[serde(default, rename = "override")]
    pub override_attrs: Map<String, Value>,

    /// Merged view persisted after the last run (output only)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub merged: Map<String, Value>,

    /// When the node last completed a run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl NodeDocument {
    /// Load a node document from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read node document: {}", path.display()))?;
        let doc: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid node document: {}", path.display()))?;
        if doc.name.is_empty() {
            anyhow::bail!("Node document {} has no name", path.display());
        }
        Ok(doc)
    }

    /// Save the document back to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize node document")?;
        std::fs::write(path, content)
            .with_context(|| format!("Could not write node document: {}", path.display()))?;
        Ok(())
    }

    /// Build the in-memory node and run list for a run.
    pub fn to_node(&self) -> Result<(Node, RunList)> {
        let mut node = Node::new(&self.name);
        node.attrs.merge(Layer::Default, &self.default_attrs);
        node.attrs.merge(Layer::Normal, &self.normal_attrs);
        node.attrs.merge(Layer::Override, &self.override_attrs);

        let run_list = RunList::parse(&self.run_list)?;
        Ok((node, run_list))
    }

    /// Record the run's outcome: final merged view plus a timestamp.
    pub fn record_run(&mut self, node: &Node) {
        self.merged = node.attrs.merged_view();
        self.last_run = Some(Utc::now());
    }
}
