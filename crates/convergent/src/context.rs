//! The run-scoped context and the guard evaluation seam.
//!
//! Everything a run touches travels through one explicitly-passed
//! [`RunContext`]; there is no process-wide state.

use crate::report::RunReport;
use crate::resource::GuardTest;
use anyhow::Result;
use attrset::AttrLayers;
use cookbook::Version;
use std::collections::BTreeMap;

/// A node: identity plus its four attribute layers.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Node name
    pub name: String,
    /// The layered attribute data
    pub attrs: AttrLayers,
}

impl Node {
    /// Create a node with empty attribute layers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: AttrLayers::new(),
        }
    }
}

/// Evaluates guard predicates on behalf of the engine.
///
/// The binary supplies a shell-backed implementation; tests supply stubs.
/// Exit-status semantics (zero = true) belong to the implementation.
pub trait GuardEvaluator {
    /// Evaluate one predicate. An `Err` is a guard *evaluation* failure and
    /// is fatal for the guarded resource - it must not be treated as skip.
    fn eval(&self, test: &GuardTest) -> Result<bool>;
}

/// The per-run aggregate: node, resolved cookbook set, and the report
/// accumulated so far.
#[derive(Debug, Default)]
pub struct RunContext {
    /// The node being converged
    pub node: Node,
    /// Cookbook name -> chosen version, from dependency resolution
    pub cookbooks: BTreeMap<String, Version>,
    /// Append-only run report, in execution order
    pub report: RunReport,
}

impl RunContext {
    /// Create a context for one run.
    pub fn new(node: Node, cookbooks: BTreeMap<String, Version>) -> Self {
        Self {
            node,
            cookbooks,
            report: RunReport::default(),
        }
    }
}
