//! Error types for compilation and convergence.
//!
//! Compile errors abort before any system mutation. Convergence errors are
//! per-resource; the engine decides whether one aborts the run (§ failure
//! policy in [`crate::engine`]).

use thiserror::Error;

/// Errors raised while expanding recipes into the resource collection.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Two resources in the run share an identity
    #[error("duplicate resource {id}: already declared in recipe '{first_recipe}'")]
    DuplicateResource {
        /// The duplicated identity, as `type[name]`
        id: String,
        /// Recipe that declared it first
        first_recipe: String,
    },

    /// A notification names a target that never appears in the run
    #[error("{from} notifies {target}, which is never declared in this run")]
    UnknownNotifyTarget {
        /// The notifying resource
        from: String,
        /// The missing target identity
        target: String,
    },

    /// A `{{path}}` placeholder referenced an attribute no layer defines
    #[error("resource {resource} references undefined attribute '{path}'")]
    UndefinedAttribute {
        /// The dotted attribute path
        path: String,
        /// The resource whose parameter used it
        resource: String,
    },

    /// The run list names a cookbook absent from the resolved set
    #[error("cookbook '{name}' is in the run list but not in the resolved set")]
    UnresolvedCookbook {
        /// The unresolved cookbook name
        name: String,
    },

    /// The recipe source failed to produce a recipe's declarations
    #[error("failed to load recipe '{recipe}': {source}")]
    Source {
        /// Qualified recipe name, e.g. `nginx::default`
        recipe: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised while converging the resource collection.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// A guard predicate itself failed to evaluate (never treated as skip)
    #[error("guard on {resource} failed to evaluate: {source}")]
    Guard {
        /// The guarded resource
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// The provider failed to inspect or mutate the system
    #[error("{resource} ({action}): {source}")]
    Provider {
        /// The failing resource
        resource: String,
        /// The action being applied
        action: String,
        #[source]
        source: anyhow::Error,
    },

    /// No registered provider matches the resource type on this platform
    #[error("no provider for {resource} on platform '{platform}'")]
    NoProvider {
        /// The orphaned resource
        resource: String,
        /// Platform read from the node's merged view
        platform: String,
    },

    /// The run-level deadline expired
    #[error("run timed out after {elapsed_secs}s (limit {limit_secs}s)")]
    Timeout {
        /// Seconds elapsed when the deadline was observed
        elapsed_secs: u64,
        /// The configured limit
        limit_secs: u64,
    },
}

impl ConvergeError {
    /// Whether this error is scoped to one resource (and therefore subject
    /// to that resource's `ignore_failure` policy).
    pub fn is_resource_scoped(&self) -> bool {
        !matches!(self, ConvergeError::Timeout { .. })
    }
}
