//! # Convergent
//!
//! Resource compilation and idempotent convergence.
//!
//! This crate turns an already-resolved run (run list + one version per
//! cookbook) into an ordered [`ResourceCollection`] and walks that
//! collection against the live system, invoking platform-appropriate
//! providers for exactly the resources whose current state drifted from
//! their declared state.
//!
//! ## Core concepts
//!
//! - **Resource**: a declarative unit of desired state, identified by
//!   `type[name]`, guarded by `only_if`/`not_if`, wired to other resources
//!   through notification edges
//! - **Provider**: the platform-specific implementation behind a resource
//!   type - load current state, converge one action
//! - **Engine**: the sequential state machine that applies the collection
//!   and aggregates the run report
//!
//! ## Example
//!
//! ```ignore
//! use convergent::{
//!     compile, ConvergeOptions, Engine, Node, ProviderRegistry, PlatformRule,
//!     RunContext,
//! };
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register("file", PlatformRule::Any, || Box::new(FileProvider));
//!
//! let mut node = Node::new("web01");
//! let mut collection = compile(&run_list, &resolved, &source, &mut node)?;
//!
//! let mut ctx = RunContext::new(node, resolved);
//! let engine = Engine::new(&registry, &shell_guards);
//! engine.converge(&mut collection, &mut ctx)?;
//!
//! for entry in &ctx.report.entries {
//!     println!("{} ({}) -> {:?}", entry.resource, entry.action, entry.outcome);
//! }
//! ```
//!
//! ## Seam traits
//!
//! Two traits keep the crate free of process-spawning and content-fetching
//! concerns:
//!
//! - [`RecipeSource`]: supplies recipe declarations and cookbook attributes
//! - [`GuardEvaluator`]: evaluates guard predicates
//!
//! The binary wires in real implementations; tests use stubs.

pub mod collection;
pub mod compile;
pub mod context;
pub mod engine;
pub mod error;
pub mod provider;
pub mod report;
pub mod resource;

// Re-export main types at crate root
pub use collection::ResourceCollection;
pub use compile::{compile, RecipeSource};
pub use context::{GuardEvaluator, Node, RunContext};
pub use engine::{ConvergeOptions, Engine};
pub use error::{CompileError, ConvergeError};
pub use provider::{CurrentState, PlatformInfo, PlatformRule, Provider, ProviderRegistry};
pub use report::{Outcome, ReportEntry, ReportSummary, RunReport};
pub use resource::{GuardTest, Notification, NotifyTiming, Resource, ResourceId};
