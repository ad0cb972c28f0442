//! Error types for cookbook resolution.
//!
//! Resolution failures are fatal before any system mutation occurs, so every
//! variant carries enough context to tell the operator which cookbook (and
//! whose requirement) broke the run.

use semver::VersionReq;
use thiserror::Error;

/// One version requirement in force on a cookbook, with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// Who placed the requirement ("run list" or "name (version)")
    pub required_by: String,
    /// The requirement itself
    pub req: VersionReq,
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} requires {}", self.required_by, self.req)
    }
}

fn join_constraints(constraints: &[Constraint]) -> String {
    if constraints.is_empty() {
        return "any version".to_string();
    }
    constraints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while parsing or resolving cookbooks.
#[derive(Debug, Error)]
pub enum Error {
    /// A version string could not be parsed
    #[error("invalid cookbook version '{input}': {source}")]
    InvalidVersion {
        /// The offending version string
        input: String,
        #[source]
        source: semver::Error,
    },

    /// A version constraint string could not be parsed
    #[error("invalid version constraint '{input}': {source}")]
    InvalidConstraint {
        /// The offending constraint string
        input: String,
        #[source]
        source: semver::Error,
    },

    /// A run list entry was malformed
    #[error("invalid run list entry '{entry}': {reason}")]
    InvalidRunListEntry {
        /// The offending entry
        entry: String,
        /// Why it was rejected
        reason: String,
    },

    /// A cookbook referenced by the run list or by a dependency is not in
    /// the catalog
    #[error("cookbook '{name}' (required by {required_by}) is not in the catalog")]
    MissingCookbook {
        /// Name of the missing cookbook
        name: String,
        /// Who asked for it
        required_by: String,
    },

    /// No version assignment satisfies the constraints in force
    #[error("no version of cookbook '{name}' satisfies: {}", join_constraints(constraints))]
    Unsatisfiable {
        /// The cookbook for which no candidate survived
        name: String,
        /// Every requirement in force on it when resolution failed
        constraints: Vec<Constraint>,
    },
}

/// Result type for cookbook operations.
pub type Result<T> = std::result::Result<T, Error>;
