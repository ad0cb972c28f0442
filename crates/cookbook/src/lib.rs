//! # Cookbook
//!
//! Cookbook metadata, run lists, and dependency resolution.
//!
//! A cookbook is a versioned, named bundle of recipes with declared
//! dependency constraints on other cookbooks. This crate models that
//! metadata ([`CookbookVersion`], [`Catalog`]), parses run lists
//! ([`RunList`], entries like `nginx::ssl@1.2`), and picks one consistent
//! version per cookbook for a run ([`resolve`]).
//!
//! Recipe *content* is deliberately not modeled here: the convergence layer
//! fetches it through its own source interface once versions are fixed.

pub mod error;
pub mod resolver;
pub mod types;

pub use error::{Constraint, Error, Result};
pub use resolver::resolve;
pub use types::{parse_constraint, parse_version, Catalog, CookbookVersion, RunList, RunListItem};

// Callers work with versions and ranges directly.
pub use semver::{Version, VersionReq};
